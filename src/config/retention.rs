//! Archive retention configuration.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! retention_days = 365
//! page_size = 100
//! schedule_enabled = true
//! interval_hours = 24
//! dry_run = false
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Longest accepted retention window: one hundred years.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Archive retention configuration.
///
/// Records whose fetch date is older than `retention_days` are removed by the
/// purge chain. The chain is started by `GET /cron/daily`, by the admin purge
/// endpoint, or by the in-process scheduler when `schedule_enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days to keep archive records.
    /// Default: 365
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Keys scanned and deleted per purge step.
    /// Default: 100
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Whether this process enqueues the daily purge itself, instead of
    /// relying on an external cron hitting `/cron/daily`.
    /// Default: false
    #[serde(default)]
    pub schedule_enabled: bool,

    /// How often the in-process scheduler starts a purge (in hours).
    /// Default: 24
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// If true, scan and chain as usual but skip the deletes.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            page_size: default_page_size(),
            schedule_enabled: false,
            interval_hours: default_interval_hours(),
            dry_run: false,
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    /// Purge deadline for a run starting at `now`.
    ///
    /// Saturates at the earliest representable instant, which purges nothing.
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(chrono::Duration::days(i64::from(self.retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Validation(format!(
                "retention.retention_days must be at most {MAX_RETENTION_DAYS}"
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Validation(
                "retention.page_size must be greater than zero".into(),
            ));
        }
        if self.schedule_enabled && self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_hours must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_retention_days() -> u32 {
    365
}

fn default_page_size() -> usize {
    100
}

fn default_interval_hours() -> u64 {
    24
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert_eq!(config.retention_days, 365);
        assert_eq!(config.page_size, 100);
        assert!(!config.schedule_enabled);
        assert_eq!(config.interval(), Duration::from_secs(24 * 3600));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_deadline_subtracts_window() {
        let config = RetentionConfig {
            retention_days: 30,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            config.deadline(now),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            retention_days = 90
            page_size = 50
            schedule_enabled = true
            interval_hours = 12
            dry_run = true
        "#;

        let config: RetentionConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retention_days, 90);
        assert_eq!(config.page_size, 50);
        assert!(config.schedule_enabled);
        assert_eq!(config.interval_hours, 12);
        assert!(config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let config: RetentionConfig = toml::from_str("retention_days = 4000000000").unwrap();
        assert!(config.validate().is_err());

        let config: RetentionConfig =
            toml::from_str(&format!("retention_days = {MAX_RETENTION_DAYS}")).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deadline_saturates_instead_of_panicking() {
        let config = RetentionConfig {
            retention_days: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.deadline(Utc::now()), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config: RetentionConfig = toml::from_str("page_size = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
