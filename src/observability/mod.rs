//! Observability module providing logging and metrics.
//!
//! - Structured logging with configurable formats (pretty, compact, JSON)
//! - Prometheus metrics for task dispatch, ingress, archiving and purging

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
