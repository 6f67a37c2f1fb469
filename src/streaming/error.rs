use thiserror::Error;

use super::bounded::CapExceeded;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream exceeded the {limit} byte ceiling")]
    CapExceeded { limit: u64 },

    #[error("codec error: {0}")]
    Codec(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
}

impl StreamError {
    pub fn is_cap_exceeded(&self) -> bool {
        matches!(self, Self::CapExceeded { .. })
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        match CapExceeded::from_io(&err) {
            Some(limit) => Self::CapExceeded { limit },
            None => Self::Io(err),
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
