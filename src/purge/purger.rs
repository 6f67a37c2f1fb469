use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::cursor::PurgeCursor;
use crate::{
    config::RetentionConfig,
    dispatch::{DispatchError, Dispatcher, TaskKind, TaskOutcome},
    observability::metrics,
    store::{ArchiveStore, StoreError, truncate_to_millis},
};

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to chain next purge step: {0}")]
    Dispatch(#[from] DispatchError),
}

pub type PurgeResult<T> = Result<T, PurgeError>;

/// Purge job state. Each task invocation advances the job by one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeState {
    /// Fresh job, scanning from the oldest record.
    Start { deadline: DateTime<Utc> },
    /// Resuming after the last page.
    Paging(PurgeCursor),
    Done,
}

/// Results from a single purge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStepResult {
    pub scanned: usize,
    pub deleted: u64,
    pub next: PurgeState,
}

/// Deletes archive records older than a deadline, one page per task.
///
/// A full page chains a `purge-step` task carrying the resume cursor; a
/// short page ends the job.
pub struct Purger {
    store: Arc<dyn ArchiveStore>,
    dispatcher: Arc<dyn Dispatcher>,
    page_size: usize,
    dry_run: bool,
}

impl Purger {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        dispatcher: Arc<dyn Dispatcher>,
        config: &RetentionConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            page_size: config.page_size,
            dry_run: config.dry_run,
        }
    }

    /// Handle a `purge-before` task. The payload is the deadline as a JSON
    /// timestamp.
    pub async fn purge_before(&self, payload: &[u8]) -> PurgeResult<TaskOutcome> {
        let deadline: DateTime<Utc> = match serde_json::from_slice(payload) {
            Ok(deadline) => deadline,
            Err(e) => {
                tracing::error!(error = %e, "Abandoning purge: invalid deadline");
                return Ok(TaskOutcome::abandoned(format!("invalid deadline: {e}")));
            }
        };

        tracing::info!(%deadline, dry_run = self.dry_run, "Starting purge");
        self.step(PurgeState::Start { deadline }).await?;
        Ok(TaskOutcome::Completed)
    }

    /// Handle a `purge-step` task. The payload is an encoded [`PurgeCursor`].
    pub async fn purge_step(&self, payload: &[u8]) -> PurgeResult<TaskOutcome> {
        let cursor = match std::str::from_utf8(payload)
            .ok()
            .and_then(|token| PurgeCursor::decode(token).ok())
        {
            Some(cursor) => cursor,
            None => {
                tracing::error!("Abandoning purge step: invalid cursor");
                return Ok(TaskOutcome::abandoned("invalid purge cursor"));
            }
        };

        self.step(PurgeState::Paging(cursor)).await?;
        Ok(TaskOutcome::Completed)
    }

    /// Scan and delete one page, chaining the next step when the page was full.
    pub async fn step(&self, state: PurgeState) -> PurgeResult<PurgeStepResult> {
        let (deadline, after) = match state {
            // Stores and cursors keep milliseconds; every page compares
            // against the same truncated deadline.
            PurgeState::Start { deadline } => (truncate_to_millis(deadline), None),
            PurgeState::Paging(cursor) => (cursor.deadline, Some(cursor.position)),
            PurgeState::Done => {
                return Ok(PurgeStepResult {
                    scanned: 0,
                    deleted: 0,
                    next: PurgeState::Done,
                });
            }
        };

        let page = self
            .store
            .scan_keys_before(deadline, after.as_ref(), self.page_size)
            .await?;
        let scanned = page.keys.len();

        let deleted = if self.dry_run {
            tracing::info!(
                %deadline,
                scanned,
                "DRY RUN: Would delete {} archive records",
                scanned
            );
            0
        } else {
            self.store.delete_many(&page.keys).await?
        };
        metrics::record_purge_deletion(deleted, self.dry_run);

        let next = match page.cursor {
            Some(position) if scanned == self.page_size => {
                let cursor = PurgeCursor { deadline, position };
                self.dispatcher
                    .enqueue(TaskKind::PurgeStep, cursor.encode().into_bytes())
                    .await?;
                PurgeState::Paging(cursor)
            }
            _ => {
                tracing::info!(%deadline, "Purge complete");
                PurgeState::Done
            }
        };

        tracing::debug!(scanned, deleted, "Purge step finished");
        Ok(PurgeStepResult {
            scanned,
            deleted,
            next,
        })
    }
}
