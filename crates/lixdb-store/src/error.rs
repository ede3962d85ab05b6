// Error types module
use thiserror::Error;

/// Storage-related errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Other(String),
}

impl StoreError {
    /// Create a duplicate-key error
    pub fn duplicate<S: Into<String>>(msg: S) -> Self {
        StoreError::Duplicate(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        StoreError::NotFound(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        StoreError::Other(msg.into())
    }
}
