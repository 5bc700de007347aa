use thiserror::Error;

use paperboy_storage::StorageError;

/// Errors from recipient management.
///
/// The first two are caller input errors and are raised synchronously,
/// never degraded to a boolean.
#[derive(Debug, Error)]
pub enum RecipientError {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("recipient already registered: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, RecipientError>;
