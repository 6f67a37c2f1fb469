//! Durable task dispatch.
//!
//! Work that must survive failures is never done inline. Callers
//! [`enqueue`](Dispatcher::enqueue) a [`TaskKind`] with an opaque payload;
//! the dispatch worker later posts that payload to the kind's handler
//! endpoint, retrying with per-kind backoff until the handler succeeds or the
//! retry limit is reached. Delivery is at least once.
//!
//! Two queue backends are available:
//!
//! - `memory`: process memory, for development and tests.
//! - `file`: one JSON file per pending task, reloaded on startup.

mod dispatcher;
mod error;
mod file;
mod memory;
mod signing;
#[cfg(test)]
pub(crate) mod testing;
mod traits;
pub mod worker;

use std::{path::Path, sync::Arc};

pub use dispatcher::QueueDispatcher;
pub use error::{DispatchError, DispatchResult};
pub use file::FileTaskQueue;
pub use memory::MemoryTaskQueue;
pub use signing::{sign_task, verify_task};
pub use traits::{Dispatcher, TaskEntry, TaskHandle, TaskKind, TaskOutcome, TaskQueue};

use crate::config::QueueConfig;

/// Header the dispatcher sets on every invocation; handlers reject requests
/// without it.
pub const TASK_NAME_HEADER: &str = "X-Task-Name";

/// Hex HMAC over the task name and payload; see [`sign_task`].
pub const TASK_SIGNATURE_HEADER: &str = "X-Task-Signature";

/// Number of failed attempts before this invocation.
pub const TASK_RETRY_COUNT_HEADER: &str = "X-Task-Retry-Count";

/// Create a task queue from configuration.
pub async fn create_task_queue(config: &QueueConfig) -> DispatchResult<Arc<dyn TaskQueue>> {
    match config {
        QueueConfig::Memory => {
            tracing::warn!("Using in-memory task queue; pending tasks are lost on restart");
            Ok(Arc::new(MemoryTaskQueue::new()))
        }
        QueueConfig::File { path } => create_file_queue(path).await,
    }
}

async fn create_file_queue(path: &Path) -> DispatchResult<Arc<dyn TaskQueue>> {
    let queue = FileTaskQueue::new(path).await?;
    Ok(Arc::new(queue))
}
