//! End-to-end exercise of one job day against a shared backend: claim the
//! execution slot, fail three times, trip the breaker, reset after success,
//! and mark deliveries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use paperboy_core::notify::AdminNotifier;
use paperboy_core::Mode;
use paperboy_recipients::RecipientManager;
use paperboy_storage::{SqliteBackend, StorageBackend};
use paperboy_trackers::{
    check_failure_limit, check_idempotency, record_failure, DeliveryTracker, ExecutionTracker,
    FailureTracker, RunGate,
};

#[derive(Default)]
struct CountingNotifier {
    sent: AtomicUsize,
}

impl AdminNotifier for CountingNotifier {
    fn notify(&self, _subject: &str, _message: &str) -> bool {
        self.sent.fetch_add(1, Ordering::SeqCst);
        true
    }
}

struct Harness {
    execution: ExecutionTracker,
    failure: FailureTracker,
    delivery: DeliveryTracker,
    recipients: RecipientManager,
    notifier: CountingNotifier,
}

fn harness() -> Harness {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::open_in_memory().unwrap());
    Harness {
        execution: ExecutionTracker::new(Arc::clone(&backend)),
        failure: FailureTracker::new(Arc::clone(&backend)),
        delivery: DeliveryTracker::new(Arc::clone(&backend)),
        recipients: RecipientManager::new(Arc::clone(&backend)),
        notifier: CountingNotifier::default(),
    }
}

#[tokio::test]
async fn three_strikes_then_reset() {
    let h = harness();

    // Claim today's operational slot.
    let gate = check_idempotency(&h.execution, Mode::Opr, "req-1", false).await;
    assert!(gate.is_proceed());

    // A retried invocation is told to go away.
    let gate = check_idempotency(&h.execution, Mode::Opr, "req-retry", false).await;
    assert_eq!(gate, RunGate::DuplicateExecution { mode: Mode::Opr });

    // The pipeline fails three times over the day.
    assert_eq!(record_failure(&h.failure, &h.notifier, "timeout").await, 1);
    assert_eq!(
        record_failure(&h.failure, &h.notifier, "login failed").await,
        2
    );
    assert_eq!(record_failure(&h.failure, &h.notifier, "pdf empty").await, 3);

    // Breaker open, admin told exactly once (on the third strike).
    assert!(h.failure.should_skip_today().await);
    assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 1);
    let info = h.failure.failure_info(None).await.unwrap();
    assert_eq!(info.failure_count, 3);
    assert_eq!(info.last_error.as_deref(), Some("pdf empty"));

    // A later success resets the breaker.
    assert!(h.failure.reset_today().await);
    assert!(!h.failure.should_skip_today().await);
    let gate = check_failure_limit(&h.failure, &h.notifier).await;
    assert!(gate.is_proceed());
}

#[tokio::test]
async fn successful_day_marks_everyone_delivered() {
    let h = harness();
    h.recipients.register("a@x.com", "A").await.unwrap();
    h.recipients.register("b@x.com", "B").await.unwrap();

    let gate = check_idempotency(&h.execution, Mode::Opr, "req-1", false).await;
    assert!(gate.is_proceed());
    let gate = check_failure_limit(&h.failure, &h.notifier).await;
    assert!(gate.is_proceed());

    assert!(!h.delivery.is_delivered_today().await);

    // External send succeeds for both recipients.
    let sent = vec!["a@x.com".to_string(), "b@x.com".to_string()];
    assert!(h.delivery.mark_as_delivered(&sent).await);
    assert!(h.failure.reset_today().await);

    // A rerun the same day can exit early.
    assert!(h.delivery.is_delivered_today().await);
    assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsubscribe_link_flow_hard_deletes() {
    let h = harness();
    h.recipients.register("a@x.com", "A").await.unwrap();
    h.recipients.register("b@x.com", "B").await.unwrap();

    // The unsubscribe link removes the record entirely.
    assert!(h.recipients.delete("a@x.com").await.unwrap());
    assert!(h.recipients.get("a@x.com").await.unwrap().is_none());

    // Delivery accounting only sees the survivor.
    assert!(h.delivery.mark_as_delivered(&["b@x.com".to_string()]).await);
    assert!(h.delivery.is_delivered_today().await);
}

#[tokio::test]
async fn test_and_opr_modes_run_independently() {
    let h = harness();
    assert!(check_idempotency(&h.execution, Mode::Test, "req-t", false)
        .await
        .is_proceed());
    assert!(check_idempotency(&h.execution, Mode::Opr, "req-o", false)
        .await
        .is_proceed());
    assert!(h.execution.should_skip_execution(Mode::Test).await);
    assert!(h.execution.should_skip_execution(Mode::Opr).await);
}
