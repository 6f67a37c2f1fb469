//! Dispatch worker.
//!
//! The worker polls the task queue for due tasks and delivers each one to
//! its handler endpoint:
//! 1. Due tasks are leased so concurrent polls skip them
//! 2. Each is invoked with bounded concurrency
//! 3. Success removes the task; failure reschedules it with backoff
//! 4. A task that exhausts its retry policy is logged, counted and dropped

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use http::header::CONTENT_TYPE;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{
    TASK_NAME_HEADER, TASK_RETRY_COUNT_HEADER, TASK_SIGNATURE_HEADER,
    error::DispatchResult,
    signing::sign_task,
    traits::{TaskEntry, TaskQueue},
};
use crate::{config::DispatcherConfig, observability::metrics};

/// Longest handler response body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("handler returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Delivers one task to its handler.
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    async fn invoke(&self, entry: &TaskEntry) -> Result<(), InvokeError>;
}

/// Invokes handlers over HTTP by posting the payload to
/// `{base_url}{kind.handler_path()}`, signed with `signing_key`.
pub struct HttpInvoker {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
    signing_key: Vec<u8>,
}

impl HttpInvoker {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        timeout: std::time::Duration,
        signing_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            signing_key: signing_key.into(),
        }
    }
}

#[async_trait]
impl TaskInvoker for HttpInvoker {
    async fn invoke(&self, entry: &TaskEntry) -> Result<(), InvokeError> {
        let url = format!("{}{}", self.base_url, entry.kind.handler_path());
        let name = entry.name();
        let signature = sign_task(&self.signing_key, &name, &entry.payload)
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(TASK_NAME_HEADER, name)
            .header(TASK_SIGNATURE_HEADER, signature)
            .header(TASK_RETRY_COUNT_HEADER, entry.attempts.to_string())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(entry.payload.clone())
            .send()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(InvokeError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}

/// Results from a single poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRunResult {
    pub completed: usize,
    pub retried: usize,
    pub abandoned: usize,
}

impl WorkerRunResult {
    pub fn total(&self) -> usize {
        self.completed + self.retried + self.abandoned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Completed,
    Retried,
    Abandoned,
}

/// Starts the dispatch worker as a background task.
///
/// Runs until `cancel` fires. In-flight invocations are allowed to finish;
/// anything they fail to settle is picked up again once its lease expires.
pub async fn start_dispatch_worker(
    queue: Arc<dyn TaskQueue>,
    invoker: Arc<dyn TaskInvoker>,
    config: DispatcherConfig,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    if !config.worker_enabled {
        tracing::info!("Dispatch worker disabled by configuration");
        return;
    }

    tracing::info!(
        poll_interval_ms = config.poll_interval_ms,
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        "Starting dispatch worker"
    );

    while !cancel.is_cancelled() {
        let saturated = match run_due_tasks(&queue, &invoker, &config).await {
            Ok(result) => {
                if result.total() > 0 {
                    tracing::debug!(
                        completed = result.completed,
                        retried = result.retried,
                        abandoned = result.abandoned,
                        "Dispatch poll complete"
                    );
                }
                result.total() >= config.batch_size
            }
            Err(e) => {
                tracing::error!(error = %e, "Error polling task queue");
                false
            }
        };

        if let Ok(depth) = queue.len().await {
            metrics::set_queue_depth(depth);
        }

        // A full batch means more work is probably due right now
        if saturated {
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(config.poll_interval()) => {}
        }
    }

    tracing::info!("Dispatch worker stopped");
}

/// Lease and invoke every task due now, up to the configured batch size.
pub async fn run_due_tasks(
    queue: &Arc<dyn TaskQueue>,
    invoker: &Arc<dyn TaskInvoker>,
    config: &DispatcherConfig,
) -> DispatchResult<WorkerRunResult> {
    let now = Utc::now();
    let leased = queue
        .lease_due(now, instant_after(now, config.lease()), config.batch_size)
        .await?;

    if leased.is_empty() {
        return Ok(WorkerRunResult::default());
    }

    let deliveries: Vec<Delivery> = futures::stream::iter(leased)
        .map(|entry| deliver(queue, invoker, config, entry))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    let mut result = WorkerRunResult::default();
    for delivery in deliveries {
        match delivery {
            Delivery::Completed => result.completed += 1,
            Delivery::Retried => result.retried += 1,
            Delivery::Abandoned => result.abandoned += 1,
        }
    }

    Ok(result)
}

async fn deliver(
    queue: &Arc<dyn TaskQueue>,
    invoker: &Arc<dyn TaskInvoker>,
    config: &DispatcherConfig,
    entry: TaskEntry,
) -> Delivery {
    let started = Instant::now();
    let result = invoker.invoke(&entry).await;
    let elapsed = started.elapsed().as_secs_f64();
    let kind = entry.kind.as_str();

    let err = match result {
        Ok(()) => {
            if let Err(e) = queue.remove(entry.id).await {
                tracing::error!(task = %entry.name(), error = %e, "Failed to remove completed task");
            }
            metrics::record_task_invocation(kind, "completed", elapsed);
            tracing::debug!(task = %entry.name(), attempts = entry.attempts, "Task completed");
            return Delivery::Completed;
        }
        Err(err) => err,
    };

    let attempts = entry.attempts + 1;
    let policy = config.retry.policy_for(entry.kind);

    if policy.is_exhausted(attempts) {
        if let Err(e) = queue.remove(entry.id).await {
            tracing::error!(task = %entry.name(), error = %e, "Failed to remove abandoned task");
        }
        metrics::record_task_invocation(kind, "abandoned", elapsed);
        tracing::error!(
            task = %entry.name(),
            attempts = attempts,
            error = %err,
            "Abandoning task after exhausting its retry limit"
        );
        return Delivery::Abandoned;
    }

    let delay = policy.backoff(attempts);
    let not_before = instant_after(Utc::now(), delay);
    if let Err(e) = queue
        .reschedule(entry.id, not_before, err.to_string())
        .await
    {
        tracing::error!(task = %entry.name(), error = %e, "Failed to reschedule task");
    }
    metrics::record_task_invocation(kind, "retried", elapsed);
    tracing::warn!(
        task = %entry.name(),
        attempts = attempts,
        retry_in_secs = delay.as_secs(),
        error = %err,
        "Task failed, will retry"
    );

    Delivery::Retried
}

fn instant_after(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
