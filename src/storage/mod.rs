//! Record stores for monitoring state
//!
//! This module provides a trait-based abstraction over where hosts,
//! services, events, downtimes and acknowledgements live.
//!
//! ## Design
//!
//! - **Trait-based**: `RecordStore` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Plain records**: The engine owns all semantics, stores only persist
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory** (fallback): No persistence, for testing or ephemeral setups
//!
//! ## Usage
//!
//! ```no_run
//! use siem_monitoring::storage::{RecordStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./siem.db").await?;
//!     let hosts = store.list_hosts().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{DowntimeFilter, EventQuery, HealthStatus, RecordStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// Shared handle to the configured record store
pub type SharedStore = Arc<dyn RecordStore>;

/// Builds the record store selected by the configuration
///
/// Falls back to the in-memory store when no storage section is present.
pub async fn build_store(config: Option<&StorageConfig>) -> StorageResult<SharedStore> {
    match config {
        None | Some(StorageConfig::None) => {
            info!("using in-memory record store (no persistence)");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        Some(StorageConfig::Sqlite { path }) => {
            let store = sqlite::SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        Some(StorageConfig::Sqlite { .. }) => Err(StorageError::InvalidConfig(
            "sqlite storage requested but the storage-sqlite feature is disabled".to_string(),
        )),
    }
}
