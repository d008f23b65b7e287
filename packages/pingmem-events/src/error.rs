use thiserror::Error;

pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Error taxonomy for the event store, session manager and memory
/// manager — kinds mirror the machine-readable codes shared across the
/// workspace, not Rust type names.
#[derive(Error, Debug)]
pub enum EventStoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl EventStoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
