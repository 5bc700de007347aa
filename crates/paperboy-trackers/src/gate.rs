use tracing::{error, info, warn};

use paperboy_core::config::MAX_FAILURES_PER_DAY;
use paperboy_core::notify::{sanitize_error, AdminNotifier};
use paperboy_core::Mode;

use crate::execution::ExecutionTracker;
use crate::failure::FailureTracker;

/// Outcome of a pre-run gate check.
///
/// The orchestrator surfaces each non-proceed variant as its own status so
/// operators can tell "nothing to do" from "something is broken".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunGate {
    Proceed,
    /// Today's slot for this mode was already claimed by an earlier call.
    DuplicateExecution { mode: Mode },
    /// The failure limit was reached earlier today.
    CircuitOpen { failure_count: i64 },
}

impl RunGate {
    pub fn is_proceed(&self) -> bool {
        matches!(self, RunGate::Proceed)
    }
}

/// Idempotency gate: claim today's slot before any work happens.
///
/// `skip_idempotency` exists for manual test runs only; it bypasses the one
/// safeguard against duplicate triggering, hence the loud warning.
pub async fn check_idempotency(
    tracker: &ExecutionTracker,
    mode: Mode,
    request_id: &str,
    skip_idempotency: bool,
) -> RunGate {
    if skip_idempotency {
        warn!("idempotency check disabled by request");
        return RunGate::Proceed;
    }

    if tracker.mark_execution(mode, request_id).await {
        info!(%mode, request_id, "idempotency gate passed, first run today");
        RunGate::Proceed
    } else {
        warn!(%mode, "duplicate execution prevented");
        RunGate::DuplicateExecution { mode }
    }
}

/// Circuit-breaker gate: refuse to run once today has failed three times.
/// Notifies the admin when it blocks.
pub async fn check_failure_limit(
    tracker: &FailureTracker,
    notifier: &dyn AdminNotifier,
) -> RunGate {
    if !tracker.should_skip_today().await {
        info!("failure limit gate passed");
        return RunGate::Proceed;
    }

    let failure_count = tracker
        .failure_info(None)
        .await
        .map(|r| r.failure_count)
        .unwrap_or(MAX_FAILURES_PER_DAY);
    error!(failure_count, "failure limit reached, delivery skipped");

    let delivered = notifier.notify(
        "[paperboy] delivery skipped",
        &format!(
            "Delivery was skipped after {} failures today.",
            failure_count
        ),
    );
    if !delivered {
        error!("admin notification failed");
    }

    RunGate::CircuitOpen { failure_count }
}

/// Record a pipeline failure and return the new count. Fires the admin
/// notification when the count reaches the limit, with the error message
/// sanitised of credentials first.
pub async fn record_failure(
    tracker: &FailureTracker,
    notifier: &dyn AdminNotifier,
    error_message: &str,
) -> i64 {
    let count = tracker.increment_failure(error_message).await;
    error!(count, "pipeline failure recorded");

    if count >= MAX_FAILURES_PER_DAY {
        let delivered = notifier.notify(
            "[paperboy] delivery failure alert",
            &format!(
                "Delivery failed {} times today.\n\nLast error: {}",
                count,
                sanitize_error(error_message)
            ),
        );
        if !delivered {
            error!("admin notification failed");
        }
    }
    count
}
