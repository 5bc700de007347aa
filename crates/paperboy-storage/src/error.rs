use thiserror::Error;

/// Errors from the storage layer.
///
/// A conditional-insert collision is NOT an error — `put_execution` reports
/// it as `Ok(false)` so callers can tell "already claimed" apart from a
/// genuine transport failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A DynamoDB call failed. The operation name is kept so degraded-path
    /// log lines stay greppable.
    #[error("dynamodb {op} failed: {message}")]
    Dynamo { op: &'static str, message: String },

    /// The store returned a record that does not match the expected shape.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
