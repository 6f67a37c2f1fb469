use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Archive store backend.
///
/// ```toml
/// [storage]
/// type = "sqlite"
/// path = "/var/lib/hookvault/archive.db"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process memory. Nothing survives a restart.
    #[default]
    Memory,
    Sqlite(SqliteStorageConfig),
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite(_) => "sqlite",
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Memory => Ok(()),
            Self::Sqlite(sqlite) => {
                if sqlite.path.trim().is_empty() {
                    return Err(ConfigError::Validation("storage.path must be set".into()));
                }
                if sqlite.max_connections == 0 {
                    return Err(ConfigError::Validation(
                        "storage.max_connections must be greater than zero".into(),
                    ));
                }
                if cfg!(not(feature = "database-sqlite")) {
                    return Err(ConfigError::Validation(
                        "storage type 'sqlite' requires the 'database-sqlite' feature".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStorageConfig {
    /// Database file path.
    pub path: String,

    /// Default: true
    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    /// Use write-ahead logging.
    /// Default: true
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Default: 5000
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Default: 5
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    5
}
