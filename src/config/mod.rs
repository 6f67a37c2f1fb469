//! Configuration loading.
//!
//! Configuration is read from a TOML file. `${VAR}` references are expanded
//! from the environment before parsing (references inside comments are left
//! alone), every section rejects unknown keys, and the parsed result is
//! validated before it is handed to the rest of the service.

mod app;
mod dispatcher;
mod limits;
mod observability;
mod retention;
mod server;
mod storage;

use std::path::Path;

pub use app::*;
pub use dispatcher::*;
pub use limits::*;
pub use observability::*;
pub use retention::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use storage::*;

/// Root configuration for the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookvaultConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub app: AppConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub listing: ListingConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl HookvaultConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: HookvaultConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.app.validate()?;
        self.limits.validate()?;
        self.dispatcher.validate()?;
        self.retention.validate()?;
        self.storage.validate()?;

        if self.server.body_limit_bytes < self.limits.ingest_max_bytes as usize {
            return Err(ConfigError::Validation(format!(
                "server.body_limit_bytes ({}) must be at least limits.ingest_max_bytes ({})",
                self.server.body_limit_bytes, self.limits.ingest_max_bytes
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are treated as commented out.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid env var pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = HookvaultConfig::from_str(
            r#"
            [app]
            key = "secret"
        "#,
        )
        .unwrap();

        assert_eq!(config.app.key, "secret");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.ingest_max_bytes, 8 * 1024 * 1024);
        assert_eq!(config.limits.max_blob_bytes, 1_048_576);
        assert_eq!(config.retention.retention_days, 365);
        assert_eq!(config.retention.page_size, 100);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(matches!(config.dispatcher.queue, QueueConfig::Memory));
    }

    #[test]
    fn test_missing_app_section_is_rejected() {
        let result = HookvaultConfig::from_str("[server]\nport = 9000\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_app_key_is_rejected() {
        let result = HookvaultConfig::from_str("[app]\nkey = \"\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = HookvaultConfig::from_str(
            r#"
            [app]
            key = "secret"
            colour = "blue"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_body_limit_below_ingest_ceiling_is_rejected() {
        let result = HookvaultConfig::from_str(
            r#"
            [server]
            body_limit_bytes = 1024

            [app]
            key = "secret"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_full_config() {
        let config = HookvaultConfig::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [app]
            key = "secret"
            admin_token = "admin"

            [listing]
            denied_resource_types = ["users", "credentials"]

            [dispatcher]
            base_url = "http://localhost:3000"
            concurrency = 2

            [dispatcher.queue]
            type = "file"
            path = "/var/lib/hookvault/tasks"

            [dispatcher.retry.purge_step]
            min_backoff_secs = 60
            max_backoff_secs = 60
            retry_limit = 5

            [retention]
            retention_days = 30
            dry_run = true

            [storage]
            type = "sqlite"
            path = "/var/lib/hookvault/archive.db"

            [observability.logging]
            format = "json"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.app.admin_token.as_deref(), Some("admin"));
        assert!(config.listing.is_denied("users"));
        assert!(!config.listing.is_denied("invoices"));
        assert_eq!(config.dispatcher.concurrency, 2);
        assert!(matches!(config.dispatcher.queue, QueueConfig::File { .. }));
        assert_eq!(config.dispatcher.retry.purge_step.retry_limit, 5);
        assert_eq!(config.retention.retention_days, 30);
        assert!(config.retention.dry_run);
        assert!(
            matches!(config.storage, StorageConfig::Sqlite(ref sqlite) if sqlite.max_connections == 5)
        );
        assert_eq!(config.observability.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("HOOKVAULT_TEST_APP_KEY", Some("from-env"), || {
            let config = HookvaultConfig::from_str(
                r#"
                [app]
                key = "${HOOKVAULT_TEST_APP_KEY}"
            "#,
            )
            .unwrap();
            assert_eq!(config.app.key, "from-env");
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("HOOKVAULT_TEST_MISSING", || {
            let result = HookvaultConfig::from_str(
                r#"
                [app]
                key = "${HOOKVAULT_TEST_MISSING}"
            "#,
            );
            assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "HOOKVAULT_TEST_MISSING"));
        });
    }

    #[test]
    fn test_env_var_in_comment_is_ignored() {
        temp_env::with_var_unset("HOOKVAULT_TEST_COMMENTED", || {
            let config = HookvaultConfig::from_str(
                r#"
                [app]
                key = "literal" # was ${HOOKVAULT_TEST_COMMENTED}
            "#,
            )
            .unwrap();
            assert_eq!(config.app.key, "literal");
        });
    }
}
