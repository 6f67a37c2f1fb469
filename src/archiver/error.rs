use thiserror::Error;

use crate::{dispatch::DispatchError, store::StoreError, streaming::StreamError};

/// Retryable archiver failures.
///
/// Inputs that can never succeed are not errors; handlers report them as
/// [`TaskOutcome::Abandoned`](crate::dispatch::TaskOutcome::Abandoned).
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to enqueue task: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("failed to fetch {href}: {source}")]
    Fetch {
        href: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{href} responded with status {status}")]
    UpstreamStatus { href: String, status: u16 },

    #[error("failed to read {href}: {source}")]
    Stream {
        href: String,
        #[source]
        source: StreamError,
    },

    #[error("fetched body is not a JSON object: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("failed to encode task payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to store record: {0}")]
    Store(#[from] StoreError),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
