use std::sync::Arc;

use tracing::{error, info, warn};

use paperboy_core::clock::today_kst;
use paperboy_core::config::MAX_FAILURES_PER_DAY;
use paperboy_storage::{FailureRecord, StorageBackend};

/// Per-calendar-day circuit breaker.
///
/// Keys on the KST date, so it auto-resets at midnight without a timer. The
/// count only moves through the backend's atomic increment; this struct
/// holds no state of its own.
pub struct FailureTracker {
    backend: Arc<dyn StorageBackend>,
}

impl FailureTracker {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// True iff today has accumulated three or more failures. An absent or
    /// unreadable record reads as "not yet failed" — the breaker only opens
    /// on positive evidence.
    pub async fn should_skip_today(&self) -> bool {
        let today = today_kst();
        match self.backend.get_failure(&today).await {
            Ok(Some(record)) if record.failure_count >= MAX_FAILURES_PER_DAY => {
                warn!(
                    date = %today,
                    failure_count = record.failure_count,
                    "failure limit reached, skipping today"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                error!(date = %today, error = %e, "failure probe failed");
                false
            }
        }
    }

    /// Record one failure and return today's new cumulative count. The
    /// message is clipped to 500 chars by the backend. On a transport error
    /// the count degrades to 1: undercounting keeps the breaker closed
    /// rather than tripping it on a flaky store.
    pub async fn increment_failure(&self, error_message: &str) -> i64 {
        let today = today_kst();
        match self.backend.increment_failure(&today, error_message).await {
            Ok(new_count) => {
                info!(date = %today, new_count, "failure recorded");
                new_count
            }
            Err(e) => {
                error!(date = %today, error = %e, "failure increment failed");
                1
            }
        }
    }

    /// Close the breaker after a fully successful run. Deleting an absent
    /// record still counts as a successful reset.
    pub async fn reset_today(&self) -> bool {
        let today = today_kst();
        match self.backend.delete_failure(&today).await {
            Ok(existed) => {
                info!(date = %today, existed, "failure count reset");
                true
            }
            Err(e) => {
                error!(date = %today, error = %e, "failure reset failed");
                false
            }
        }
    }

    /// Failure record for `date` (today when `None`).
    pub async fn failure_info(&self, date: Option<&str>) -> Option<FailureRecord> {
        let date = date.map(String::from).unwrap_or_else(today_kst);
        match self.backend.get_failure(&date).await {
            Ok(record) => record,
            Err(e) => {
                error!(%date, error = %e, "failure lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use paperboy_storage::SqliteBackend;

    use super::*;

    fn tracker() -> FailureTracker {
        FailureTracker::new(Arc::new(SqliteBackend::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn breaker_opens_on_the_third_failure() {
        let tracker = tracker();
        assert!(!tracker.should_skip_today().await);

        assert_eq!(tracker.increment_failure("timeout").await, 1);
        assert!(!tracker.should_skip_today().await);
        assert_eq!(tracker.increment_failure("login failed").await, 2);
        assert!(!tracker.should_skip_today().await);
        assert_eq!(tracker.increment_failure("pdf empty").await, 3);
        assert!(tracker.should_skip_today().await);
        // Stays open for the rest of the day.
        assert!(tracker.should_skip_today().await);
    }

    #[tokio::test]
    async fn reset_closes_the_breaker() {
        let tracker = tracker();
        for msg in ["timeout", "login failed", "pdf empty"] {
            tracker.increment_failure(msg).await;
        }
        assert!(tracker.should_skip_today().await);

        assert!(tracker.reset_today().await);
        assert!(!tracker.should_skip_today().await);
        assert!(tracker.failure_info(None).await.is_none());

        // A fresh failure after the reset starts over at 1.
        assert_eq!(tracker.increment_failure("timeout").await, 1);
    }

    #[tokio::test]
    async fn reset_with_no_failures_still_succeeds() {
        let tracker = tracker();
        assert!(tracker.reset_today().await);
    }

    #[tokio::test]
    async fn last_error_reflects_most_recent_failure() {
        let tracker = tracker();
        tracker.increment_failure("timeout").await;
        tracker.increment_failure("login failed").await;
        let info = tracker.failure_info(None).await.unwrap();
        assert_eq!(info.failure_count, 2);
        assert_eq!(info.last_error.as_deref(), Some("login failed"));
        assert!(info.updated_at.is_some());
    }
}
