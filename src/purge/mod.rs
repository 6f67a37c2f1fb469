//! Retention purge.
//!
//! A purge job deletes every archive record fetched before its deadline.
//! It runs as a chain of tasks: `purge-before` starts the job, and each full
//! page enqueues a `purge-step` carrying a [`PurgeCursor`], so no single
//! invocation does unbounded work and a failed page is retried on its own.

mod cursor;
mod purger;
mod scheduler;

pub use cursor::PurgeCursor;
pub use purger::{PurgeError, PurgeResult, PurgeState, PurgeStepResult, Purger};
pub use scheduler::{enqueue_purge, start_retention_scheduler};
