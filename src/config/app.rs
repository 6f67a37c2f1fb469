use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Shared secrets for the service.
///
/// ```toml
/// [app]
/// key = "${HOOKVAULT_APP_KEY}"
/// admin_token = "${HOOKVAULT_ADMIN_TOKEN}"
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application key. Signs inbound webhooks and authenticates outbound fetches.
    pub key: String,

    /// Bearer token for the admin purge endpoint. The endpoint is not mounted
    /// when this is unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl AppConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "app.key must be set to a non-empty value".into(),
            ));
        }
        if let Some(token) = &self.admin_token
            && token.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "app.admin_token must not be empty when set".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("key", &"****")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "****"))
            .finish()
    }
}
