pub mod backend;
pub mod db;
pub mod dynamo;
pub mod error;
pub mod factory;
pub mod sqlite;
pub mod types;

pub use backend::StorageBackend;
pub use dynamo::DynamoBackend;
pub use error::StorageError;
pub use factory::{connect, detect_backend_kind, BackendKind};
pub use sqlite::SqliteBackend;
pub use types::{
    clip_error, execution_key, ExecutionRecord, FailureRecord, Recipient, RecipientStatus,
    RecipientUpdate,
};
