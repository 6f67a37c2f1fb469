//! Prometheus metrics.
//!
//! Provides metrics for:
//! - Task dispatch (enqueues, invocation outcomes, latency)
//! - Webhook intake
//! - Resource archiving outcomes
//! - Retention purge deletions

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &seconds_from_ms(&config.latency_buckets_ms),
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

#[cfg(feature = "prometheus")]
fn seconds_from_ms(ms_buckets: &[f64]) -> Vec<f64> {
    ms_buckets.iter().map(|ms| ms / 1000.0).collect()
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a task being enqueued.
pub fn record_task_enqueued(kind: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("hookvault_tasks_enqueued_total", "kind" => kind.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = kind;
    }
}

/// Record the outcome of one task invocation.
///
/// `outcome` is one of "completed", "retried" or "abandoned".
pub fn record_task_invocation(kind: &str, outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "hookvault_task_invocations_total",
            "kind" => kind.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!("hookvault_task_invocation_duration_seconds", "kind" => kind.to_string())
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (kind, outcome, duration_secs);
    }
}

/// Record the number of tasks waiting in the queue.
pub fn set_queue_depth(depth: u64) {
    #[cfg(feature = "prometheus")]
    {
        gauge!("hookvault_task_queue_depth").set(depth as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = depth;
    }
}

/// Record a webhook intake result.
///
/// `result` is one of "accepted", "bad_signature", "too_large", "error".
pub fn record_ingress(result: &str, bytes: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("hookvault_ingress_requests_total", "result" => result.to_string())
            .increment(1);
        counter!("hookvault_ingress_bytes_total").increment(bytes);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (result, bytes);
    }
}

/// Record what happened to a single fetched resource.
///
/// `outcome` is "stored" or "abandoned". Resource types come from webhook
/// data, so they are not used as a label.
pub fn record_archive_outcome(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "hookvault_archive_outcomes_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Record archive records removed by one purge step.
pub fn record_purge_deletion(count: u64, dry_run: bool) {
    #[cfg(feature = "prometheus")]
    {
        let mode = if dry_run { "dry_run" } else { "live" };
        counter!("hookvault_purge_deleted_total", "mode" => mode).increment(count);
        counter!("hookvault_purge_steps_total", "mode" => mode).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (count, dry_run);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
