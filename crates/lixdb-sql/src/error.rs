// Error types module
use thiserror::Error;

/// Errors from the SQL preprocessing layer.
#[derive(Error, Debug)]
pub enum SqlError {
    #[error("failed to parse SQL: {0}")]
    Parse(String),

    #[error("unsupported SQL construct: {0}")]
    Unsupported(String),
}

impl SqlError {
    /// Create a parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        SqlError::Parse(msg.into())
    }

    /// Create an unsupported-construct error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        SqlError::Unsupported(msg.into())
    }
}
