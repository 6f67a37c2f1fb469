use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Byte ceilings applied to untrusted input and to listing output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Ceiling for a webhook request body.
    /// Default: 8 MiB
    #[serde(default = "default_stream_ceiling")]
    pub ingest_max_bytes: u64,

    /// Ceiling for a fetched resource body.
    /// Default: 8 MiB
    #[serde(default = "default_stream_ceiling")]
    pub fetch_max_bytes: u64,

    /// Largest compressed resource that will be stored.
    /// Default: 1 MiB
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: u64,

    /// Soft ceiling on a single listing response; output stops after the
    /// record that crosses it.
    /// Default: 30 MiB
    #[serde(default = "default_listing_max_bytes")]
    pub listing_max_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            ingest_max_bytes: default_stream_ceiling(),
            fetch_max_bytes: default_stream_ceiling(),
            max_blob_bytes: default_max_blob_bytes(),
            listing_max_bytes: default_listing_max_bytes(),
        }
    }
}

impl LimitsConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("ingest_max_bytes", self.ingest_max_bytes),
            ("fetch_max_bytes", self.fetch_max_bytes),
            ("max_blob_bytes", self.max_blob_bytes),
            ("listing_max_bytes", self.listing_max_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "limits.{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

fn default_stream_ceiling() -> u64 {
    8 * 1024 * 1024
}

fn default_max_blob_bytes() -> u64 {
    1_048_576
}

fn default_listing_max_bytes() -> u64 {
    30 * 1024 * 1024
}

/// Listing endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingConfig {
    /// Resource types that are never served, whatever the ID.
    #[serde(default)]
    pub denied_resource_types: Vec<String>,
}

impl ListingConfig {
    pub fn is_denied(&self, resource_type: &str) -> bool {
        self.denied_resource_types
            .iter()
            .any(|denied| denied == resource_type)
    }
}
