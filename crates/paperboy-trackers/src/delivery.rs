use std::sync::Arc;

use tracing::{error, info, warn};

use paperboy_core::clock::today_kst;
use paperboy_storage::{RecipientStatus, RecipientUpdate, StorageBackend};

/// Per-recipient "last successfully delivered on" bookkeeping.
///
/// Detects partial-send states: a rerun after a crash mid-send sees which
/// recipients already got today's delivery and which still need it.
pub struct DeliveryTracker {
    backend: Arc<dyn StorageBackend>,
}

impl DeliveryTracker {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// True iff every active recipient already has today's delivery mark.
    ///
    /// An empty active set also returns true — nothing to deliver — with its
    /// own warning so operators can tell that apart from "already sent". An
    /// unreadable store reads as "not delivered": the rerun merely loses an
    /// early exit, while the execution tracker still bounds duplicates.
    pub async fn is_delivered_today(&self) -> bool {
        let today = today_kst();
        let recipients = match self
            .backend
            .query_recipients_by_status(RecipientStatus::Active)
            .await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(error = %e, "active recipient query failed");
                return false;
            }
        };

        if recipients.is_empty() {
            warn!("no active recipients, treating delivery as done");
            return true;
        }

        let delivered = recipients
            .iter()
            .filter(|r| r.last_delivery_date.as_deref() == Some(today.as_str()))
            .count();

        if delivered == recipients.len() {
            info!(date = %today, delivered, "all recipients already delivered");
            true
        } else if delivered > 0 {
            info!(
                date = %today,
                delivered,
                total = recipients.len(),
                "partial delivery detected, rerun will resend"
            );
            false
        } else {
            info!(date = %today, "no deliveries recorded yet");
            false
        }
    }

    /// Stamp today's date on each recipient that was successfully sent to.
    ///
    /// Best-effort per recipient: an individual failure is logged and the
    /// batch continues. Returns true iff at least one mark was written.
    pub async fn mark_as_delivered(&self, emails: &[String]) -> bool {
        let today = today_kst();
        let mut success = 0usize;
        let mut failed = 0usize;

        for email in emails {
            let update = RecipientUpdate {
                last_delivery_date: Some(Some(today.clone())),
                ..Default::default()
            };
            match self.backend.update_recipient(email, &update).await {
                Ok(true) => success += 1,
                Ok(false) => {
                    warn!(email = %email, "delivery mark skipped: no such recipient");
                    failed += 1;
                }
                Err(e) => {
                    error!(email = %email, error = %e, "delivery mark failed");
                    failed += 1;
                }
            }
        }

        info!(date = %today, success, failed, "delivery marks written");
        success > 0
    }
}

#[cfg(test)]
mod tests {
    use paperboy_recipients::RecipientManager;
    use paperboy_storage::SqliteBackend;

    use super::*;

    fn fixture() -> (Arc<dyn StorageBackend>, DeliveryTracker, RecipientManager) {
        let backend: Arc<dyn StorageBackend> =
            Arc::new(SqliteBackend::open_in_memory().unwrap());
        let tracker = DeliveryTracker::new(Arc::clone(&backend));
        let manager = RecipientManager::new(Arc::clone(&backend));
        (backend, tracker, manager)
    }

    #[tokio::test]
    async fn empty_active_set_counts_as_done() {
        let (_, tracker, _) = fixture();
        assert!(tracker.is_delivered_today().await);
    }

    #[tokio::test]
    async fn delivery_marks_flip_the_check() {
        let (_, tracker, manager) = fixture();
        manager.register("a@x.com", "A").await.unwrap();
        manager.register("b@x.com", "B").await.unwrap();

        assert!(!tracker.is_delivered_today().await);

        // Partial send: only one recipient marked.
        assert!(tracker.mark_as_delivered(&["a@x.com".to_string()]).await);
        assert!(!tracker.is_delivered_today().await);

        assert!(tracker.mark_as_delivered(&["b@x.com".to_string()]).await);
        assert!(tracker.is_delivered_today().await);
    }

    #[tokio::test]
    async fn marking_is_idempotent_same_day() {
        let (_, tracker, manager) = fixture();
        manager.register("a@x.com", "A").await.unwrap();

        let emails = vec!["a@x.com".to_string()];
        assert!(tracker.mark_as_delivered(&emails).await);
        let first = manager.get("a@x.com").await.unwrap().unwrap();

        assert!(tracker.mark_as_delivered(&emails).await);
        let second = manager.get("a@x.com").await.unwrap().unwrap();
        assert_eq!(first.last_delivery_date, second.last_delivery_date);
        assert_eq!(second.last_delivery_date.unwrap(), today_kst());
    }

    #[tokio::test]
    async fn unknown_recipients_do_not_abort_the_batch() {
        let (_, tracker, manager) = fixture();
        manager.register("a@x.com", "A").await.unwrap();

        let emails = vec!["ghost@x.com".to_string(), "a@x.com".to_string()];
        assert!(tracker.mark_as_delivered(&emails).await);
        assert!(tracker.is_delivered_today().await);
    }

    #[tokio::test]
    async fn all_unknown_recipients_report_failure() {
        let (_, tracker, _) = fixture();
        assert!(!tracker.mark_as_delivered(&["ghost@x.com".to_string()]).await);
    }

    #[tokio::test]
    async fn unsubscribed_recipients_are_ignored_by_the_check() {
        let (_, tracker, manager) = fixture();
        manager.register("a@x.com", "A").await.unwrap();
        manager.register("b@x.com", "B").await.unwrap();
        manager.unsubscribe("b@x.com").await.unwrap();

        assert!(tracker.mark_as_delivered(&["a@x.com".to_string()]).await);
        // b@x.com never got a mark but is unsubscribed, so the day is done.
        assert!(tracker.is_delivered_today().await);
    }
}
