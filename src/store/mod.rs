mod cursor;
mod error;
mod memory;
#[cfg(feature = "database-sqlite")]
mod sqlite;
mod traits;

use std::sync::Arc;

pub use cursor::{CursorError, StoreCursor, truncate_to_millis};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "database-sqlite")]
pub use sqlite::SqliteStore;
pub use traits::{ArchiveRecord, ArchiveStore, ListPage, RecordFilter, ScanPage};

use crate::config::StorageConfig;

/// Create the archive store described by the configuration.
pub async fn create_store(config: &StorageConfig) -> StoreResult<Arc<dyn ArchiveStore>> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory archive store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "database-sqlite")]
        StorageConfig::Sqlite(sqlite) => {
            tracing::info!(path = %sqlite.path, "Opening SQLite archive store");
            Ok(Arc::new(SqliteStore::from_config(sqlite).await?))
        }
        #[cfg(not(feature = "database-sqlite"))]
        StorageConfig::Sqlite(_) => Err(StoreError::Internal(
            "SQLite storage requires the 'database-sqlite' feature".into(),
        )),
    }
}
