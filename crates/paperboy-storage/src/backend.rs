use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecutionRecord, FailureRecord, Recipient, RecipientStatus, RecipientUpdate};

/// Capability interface over the three record kinds.
///
/// Two implementations exist: [`crate::SqliteBackend`] (embedded, WAL
/// journaled) and [`crate::DynamoBackend`] (managed). Both provide the same
/// two atomic primitives — [`put_execution`](Self::put_execution)
/// (conditional insert-if-absent) and
/// [`increment_failure`](Self::increment_failure) (atomic upsert-increment) —
/// using native backend mechanisms, never an application-side
/// read-then-write. These two primitives are the only serialization points
/// in the whole subsystem.
///
/// Transport failures surface as `Err`; the tracker layer decides how to
/// degrade. A conditional-insert collision is `Ok(false)`, not an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // --- Recipients ---

    async fn get_recipient(&self, email: &str) -> Result<Option<Recipient>>;

    /// Unconditional upsert.
    async fn put_recipient(&self, recipient: &Recipient) -> Result<()>;

    async fn query_recipients_by_status(
        &self,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>>;

    /// Full listing. Implementations paginate internally and return the
    /// complete set; callers never see pagination.
    async fn get_all_recipients(&self) -> Result<Vec<Recipient>>;

    /// Partial field update. Returns `false` if no such recipient exists.
    async fn update_recipient(&self, email: &str, update: &RecipientUpdate) -> Result<bool>;

    /// Hard delete. Returns `false` if no such recipient existed.
    async fn delete_recipient(&self, email: &str) -> Result<bool>;

    // --- Execution log ---

    /// Expired records (ttl in the past) are reported as absent.
    async fn get_execution(&self, execution_key: &str) -> Result<Option<ExecutionRecord>>;

    /// Conditional insert-if-absent: `Ok(true)` iff this call created the
    /// record; `Ok(false)` leaves existing data untouched. The sole
    /// concurrency-control primitive guarding duplicate job executions.
    async fn put_execution(&self, record: &ExecutionRecord) -> Result<bool>;

    /// Operator reset of a claimed slot. Returns `false` if absent.
    async fn delete_execution(&self, execution_key: &str) -> Result<bool>;

    // --- Failure log ---

    /// Expired records (ttl in the past) are reported as absent.
    async fn get_failure(&self, date: &str) -> Result<Option<FailureRecord>>;

    /// Atomically create the day's record with count 1, or increment the
    /// existing count while overwriting `last_error`/`updated_at`/`ttl`.
    /// Returns the new count.
    async fn increment_failure(&self, date: &str, error: &str) -> Result<i64>;

    /// Circuit-breaker reset. Returns `false` if no record existed.
    async fn delete_failure(&self, date: &str) -> Result<bool>;
}
