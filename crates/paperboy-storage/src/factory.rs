use std::sync::Arc;

use tracing::info;

use paperboy_core::config::StorageConfig;

use crate::backend::StorageBackend;
use crate::dynamo::DynamoBackend;
use crate::error::Result;
use crate::sqlite::SqliteBackend;

/// Which backend family a process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Managed-cloud environment detected.
    Dynamo,
    /// Local / embedded environment.
    Sqlite,
}

/// Pure function of one environment signal: the managed-cloud runtime marker
/// selects DynamoDB, its absence selects the embedded SQLite file.
pub fn detect_backend_kind() -> BackendKind {
    if std::env::var("AWS_EXECUTION_ENV").is_ok() {
        BackendKind::Dynamo
    } else {
        BackendKind::Sqlite
    }
}

/// Construct the backend for this process.
///
/// Call once at startup and hand the returned `Arc` to every tracker and
/// manager; selection is never re-evaluated mid-process. Construction errors
/// propagate so a misconfigured store fails loudly at boot instead of on the
/// first write.
pub async fn connect(storage: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    connect_kind(detect_backend_kind(), storage).await
}

/// As [`connect`], with the family chosen by the caller. Used by tests and
/// by operator tooling that must reach a specific store.
pub async fn connect_kind(
    kind: BackendKind,
    storage: &StorageConfig,
) -> Result<Arc<dyn StorageBackend>> {
    match kind {
        BackendKind::Dynamo => {
            info!("storage backend: dynamodb");
            Ok(Arc::new(DynamoBackend::connect(storage).await?))
        }
        BackendKind::Sqlite => {
            info!(path = %storage.db_path, "storage backend: sqlite");
            Ok(Arc::new(SqliteBackend::open(&storage.db_path)?))
        }
    }
}
