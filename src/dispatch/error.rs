use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
