//! Per-service update serialization

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::storage::schema::ServiceId;

/// One async mutex per service
///
/// Holding the guard returned by [`ServiceLocks::lock`] guarantees that no
/// other state update for the same service runs concurrently. Updates of
/// different services never wait on each other.
#[derive(Debug, Default)]
pub struct ServiceLocks {
    locks: Mutex<HashMap<ServiceId, Arc<AsyncMutex<()>>>>,
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, service_id: ServiceId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(service_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops locks nobody is holding or waiting for
    pub fn prune(&self) {
        self.locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
