use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Error taxonomy for the graph/vector/diagnostics sinks. Variant *kinds*
/// mirror the machine-readable codes shared across the workspace.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external store error: {0}")]
    ExternalStore(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl StorageError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::ExternalStore(format!("sqlite error: {err}"))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Parse(format!("json error: {err}"))
    }
}
