use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    /// A user-supplied calendar date did not parse as YYYY-MM-DD.
    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    /// A user-supplied execution mode was neither "test" nor "opr".
    #[error("invalid execution mode: {0}")]
    InvalidMode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
