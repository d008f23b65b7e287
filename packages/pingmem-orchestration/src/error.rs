use thiserror::Error;

pub type Result<T> = std::result::Result<T, FacadeError>;

/// Composite components add context but never swallow causes.
#[derive(Error, Debug)]
pub enum FacadeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Core { context: String, #[source] source: pingmem_core::CoreError },

    #[error("{context}: {source}")]
    Storage { context: String, #[source] source: pingmem_storage::StorageError },
}

impl FacadeError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn core(context: impl Into<String>, source: pingmem_core::CoreError) -> Self {
        Self::Core { context: context.into(), source }
    }

    pub fn storage(context: impl Into<String>, source: pingmem_storage::StorageError) -> Self {
        Self::Storage { context: context.into(), source }
    }
}
