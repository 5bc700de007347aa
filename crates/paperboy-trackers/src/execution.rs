use std::sync::Arc;

use tracing::{error, info, warn};

use paperboy_core::clock::{now_rfc3339, today_kst, ttl_epoch};
use paperboy_core::config::RECORD_TTL_DAYS;
use paperboy_core::Mode;
use paperboy_storage::{execution_key, ExecutionRecord, StorageBackend};

/// At-most-once execution per day+mode.
///
/// The guarantee lives entirely in the backend's conditional insert, so it
/// holds across processes: overlapping schedules, manual re-invocations and
/// retried cold starts all race on the same `{date}#{mode}` key and exactly
/// one wins.
pub struct ExecutionTracker {
    backend: Arc<dyn StorageBackend>,
}

impl ExecutionTracker {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Claim today's execution slot for `mode`.
    ///
    /// `true` means this call is the first and only claimant today and the
    /// run may proceed. `false` means either a prior call already claimed
    /// the slot, or the store was unreachable — in both cases the caller
    /// must not proceed.
    pub async fn mark_execution(&self, mode: Mode, request_id: &str) -> bool {
        let date = today_kst();
        let record = ExecutionRecord {
            execution_key: execution_key(&date, mode),
            date,
            mode,
            request_id: request_id.to_string(),
            execution_time: now_rfc3339(),
            ttl: ttl_epoch(RECORD_TTL_DAYS),
        };

        match self.backend.put_execution(&record).await {
            Ok(true) => {
                info!(key = %record.execution_key, request_id, "execution recorded");
                true
            }
            Ok(false) => {
                warn!(key = %record.execution_key, "already executed today, skipping");
                false
            }
            Err(e) => {
                error!(key = %record.execution_key, error = %e, "execution record write failed");
                false
            }
        }
    }

    /// Read-only probe: has today's slot for `mode` already been claimed?
    /// An unreadable store reads as "not yet executed".
    pub async fn should_skip_execution(&self, mode: Mode) -> bool {
        let key = execution_key(&today_kst(), mode);
        match self.backend.get_execution(&key).await {
            Ok(Some(record)) => {
                warn!(
                    key = %key,
                    request_id = %record.request_id,
                    execution_time = %record.execution_time,
                    "already executed today"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(key = %key, error = %e, "execution probe failed");
                false
            }
        }
    }

    /// Execution record for `mode` on `date` (today when `None`).
    pub async fn execution_info(&self, mode: Mode, date: Option<&str>) -> Option<ExecutionRecord> {
        let date = date.map(String::from).unwrap_or_else(today_kst);
        let key = execution_key(&date, mode);
        match self.backend.get_execution(&key).await {
            Ok(record) => record,
            Err(e) => {
                error!(key = %key, error = %e, "execution lookup failed");
                None
            }
        }
    }
}
