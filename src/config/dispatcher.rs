//! Task dispatcher configuration.
//!
//! ```toml
//! [dispatcher]
//! base_url = "http://127.0.0.1:8080"
//! poll_interval_ms = 1000
//! batch_size = 32
//! concurrency = 8
//!
//! [dispatcher.queue]
//! type = "file"
//! path = "/var/lib/hookvault/tasks"
//!
//! [dispatcher.retry.save_resource]
//! min_backoff_secs = 300
//! max_backoff_secs = 300
//! retry_limit = 20
//! ```

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::{ConfigError, ServerConfig};
use crate::dispatch::TaskKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Whether this process runs the worker that invokes queued tasks.
    /// Default: true
    #[serde(default = "default_true")]
    pub worker_enabled: bool,

    /// Base URL the worker posts task invocations to. Defaults to the local
    /// listener.
    #[serde(default)]
    pub base_url: Option<String>,

    /// How long the worker idles between polls when nothing is due.
    /// Default: 1000 ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum tasks leased per poll.
    /// Default: 32
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum concurrent invocations per poll.
    /// Default: 8
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long a leased task stays invisible to other polls.
    /// Default: 600 seconds
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Timeout for a single handler invocation.
    /// Default: 540 seconds
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_enabled: true,
            base_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            lease_secs: default_lease_secs(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
            queue: QueueConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    /// The configured base URL, or the local listener address.
    pub fn invoke_base_url(&self, server: &ServerConfig) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = if server.host.is_unspecified() {
                    "127.0.0.1".to_string()
                } else if server.host.is_ipv6() {
                    format!("[{}]", server.host)
                } else {
                    server.host.to_string()
                };
                format!("http://{}:{}", host, server.port)
            }
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.batch_size must be greater than zero".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.concurrency must be greater than zero".into(),
            ));
        }
        if let Some(url) = &self.base_url {
            url::Url::parse(url).map_err(|e| {
                ConfigError::Validation(format!("dispatcher.base_url is not a valid URL: {e}"))
            })?;
        }
        for kind in TaskKind::ALL {
            self.retry.policy_for(kind).validate(kind)?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    32
}

fn default_concurrency() -> usize {
    8
}

fn default_lease_secs() -> u64 {
    600
}

fn default_invoke_timeout_secs() -> u64 {
    540
}

/// Where pending tasks live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum QueueConfig {
    /// Process memory. Pending work is lost on restart.
    #[default]
    Memory,
    /// One JSON file per task under `path`, reloaded on startup.
    File { path: PathBuf },
}

impl QueueConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File { .. } => "file",
        }
    }
}

/// Backoff and abandonment policy for one task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    #[serde(default = "default_fixed_backoff_secs")]
    pub min_backoff_secs: u64,

    #[serde(default = "default_fixed_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Total attempts before the task is abandoned.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed()
    }
}

impl RetryPolicy {
    /// Five minutes between attempts, twenty attempts.
    pub fn fixed() -> Self {
        Self {
            min_backoff_secs: default_fixed_backoff_secs(),
            max_backoff_secs: default_fixed_backoff_secs(),
            retry_limit: default_retry_limit(),
        }
    }

    fn exponential() -> Self {
        Self {
            min_backoff_secs: 10,
            max_backoff_secs: 3600,
            retry_limit: default_retry_limit(),
        }
    }

    /// Delay before the next attempt after `failures` failed attempts:
    /// `min * 2^(failures - 1)` clamped to `max`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32);
        let secs = self
            .min_backoff_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.retry_limit
    }

    fn validate(&self, kind: TaskKind) -> Result<(), ConfigError> {
        if self.retry_limit == 0 {
            return Err(ConfigError::Validation(format!(
                "dispatcher.retry.{} retry_limit must be at least 1",
                kind.config_key()
            )));
        }
        if self.min_backoff_secs > self.max_backoff_secs {
            return Err(ConfigError::Validation(format!(
                "dispatcher.retry.{} min_backoff_secs exceeds max_backoff_secs",
                kind.config_key()
            )));
        }
        Ok(())
    }
}

fn default_fixed_backoff_secs() -> u64 {
    300
}

fn default_retry_limit() -> u32 {
    20
}

/// Per-kind retry policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "RetryPolicy::exponential")]
    pub process_hook: RetryPolicy,

    #[serde(default = "RetryPolicy::fixed")]
    pub save_resource: RetryPolicy,

    #[serde(default = "RetryPolicy::fixed")]
    pub purge_before: RetryPolicy,

    #[serde(default = "RetryPolicy::fixed")]
    pub purge_step: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            process_hook: RetryPolicy::exponential(),
            save_resource: RetryPolicy::fixed(),
            purge_before: RetryPolicy::fixed(),
            purge_step: RetryPolicy::fixed(),
        }
    }
}

impl RetryConfig {
    pub fn policy_for(&self, kind: TaskKind) -> &RetryPolicy {
        match kind {
            TaskKind::ProcessHook => &self.process_hook,
            TaskKind::SaveResource => &self.save_resource,
            TaskKind::PurgeBefore => &self.purge_before,
            TaskKind::PurgeStep => &self.purge_step,
        }
    }

    /// Same policy for every kind.
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            process_hook: policy,
            save_resource: policy,
            purge_before: policy,
            purge_step: policy,
        }
    }
}
