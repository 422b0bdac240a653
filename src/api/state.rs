//! API shared state

use std::sync::Arc;

use crate::actors::{NotifierHandle, SchedulerHandle};
use crate::engine::Engine;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,

    /// Check-now requests go through the scheduler so they never overlap a cycle
    pub scheduler: Option<SchedulerHandle>,

    pub notifier: Option<NotifierHandle>,
}

impl ApiState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            scheduler: None,
            notifier: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_notifier(mut self, notifier: NotifierHandle) -> Self {
        self.notifier = Some(notifier);
        self
    }
}
