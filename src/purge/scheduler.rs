use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::RetentionConfig,
    dispatch::{DispatchError, DispatchResult, Dispatcher, TaskHandle, TaskKind},
};

/// Enqueue a fresh `purge-before` job for records fetched before `deadline`.
pub async fn enqueue_purge(
    dispatcher: &dyn Dispatcher,
    deadline: DateTime<Utc>,
) -> DispatchResult<TaskHandle> {
    let payload =
        serde_json::to_vec(&deadline).map_err(|e| DispatchError::Serialization(e.to_string()))?;
    dispatcher.enqueue(TaskKind::PurgeBefore, payload).await
}

/// Starts the retention scheduler as a background task.
///
/// Enqueues a full-window purge immediately and then every
/// `interval_hours`, until `cancel` fires. The `/cron/daily` endpoint does
/// the same for deployments driven by an external cron.
pub async fn start_retention_scheduler(
    dispatcher: Arc<dyn Dispatcher>,
    config: RetentionConfig,
    cancel: CancellationToken,
) {
    if !config.schedule_enabled {
        tracing::info!("Retention scheduler disabled by configuration");
        return;
    }

    tracing::info!(
        interval_hours = config.interval_hours,
        retention_days = config.retention_days,
        dry_run = config.dry_run,
        "Starting retention scheduler"
    );

    let interval = config.interval();

    loop {
        let deadline = config.deadline(Utc::now());
        match enqueue_purge(dispatcher.as_ref(), deadline).await {
            Ok(handle) => tracing::info!(task = %handle.name, %deadline, "Scheduled purge"),
            Err(e) => tracing::error!(error = %e, "Failed to schedule purge"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Retention scheduler stopped");
}
