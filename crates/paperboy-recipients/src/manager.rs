use std::sync::Arc;

use tracing::{info, warn};

use paperboy_core::clock::now_rfc3339;
use paperboy_storage::{Recipient, RecipientStatus, RecipientUpdate, StorageBackend};

use crate::error::{RecipientError, Result};
use crate::types::{validate_email, BulkReport};

/// Recipient lifecycle over the shared storage handle.
///
/// Status transitions keep the invariant that `unsubscribed_at` is set iff
/// the recipient is unsubscribed. Unsubscribe/resubscribe are idempotent:
/// repeating the operation in the current state reports success without
/// touching the record.
pub struct RecipientManager {
    backend: Arc<dyn StorageBackend>,
}

impl RecipientManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Register a new recipient as active.
    ///
    /// Fails with a validation error on a malformed email or one that is
    /// already registered.
    pub async fn register(&self, email: &str, name: &str) -> Result<Recipient> {
        if !validate_email(email) {
            return Err(RecipientError::InvalidEmail(email.to_string()));
        }
        if self.backend.get_recipient(email).await?.is_some() {
            warn!(email, "registration rejected: already exists");
            return Err(RecipientError::AlreadyExists(email.to_string()));
        }

        let recipient = Recipient {
            email: email.to_string(),
            name: name.to_string(),
            status: RecipientStatus::Active,
            created_at: now_rfc3339(),
            unsubscribed_at: None,
            last_delivery_date: None,
        };
        self.backend.put_recipient(&recipient).await?;
        info!(email, name, "recipient registered");
        Ok(recipient)
    }

    /// Register many `(email, name)` pairs, tallying per-item outcomes.
    /// A failing item never aborts the batch.
    pub async fn register_bulk(&self, entries: &[(String, String)]) -> BulkReport {
        let mut report = BulkReport::default();
        for (email, name) in entries {
            match self.register(email, name).await {
                Ok(_) => report.added += 1,
                Err(e) => {
                    warn!(email = %email, error = %e, "bulk registration item failed");
                    report.failed += 1;
                    report.failed_emails.push(email.clone());
                }
            }
        }
        info!(
            added = report.added,
            failed = report.failed,
            "bulk registration finished"
        );
        report
    }

    pub async fn get(&self, email: &str) -> Result<Option<Recipient>> {
        Ok(self.backend.get_recipient(email).await?)
    }

    pub async fn active_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self
            .backend
            .query_recipients_by_status(RecipientStatus::Active)
            .await?)
    }

    pub async fn all_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.backend.get_all_recipients().await?)
    }

    /// Move a recipient to unsubscribed, stamping `unsubscribed_at`.
    /// Returns `false` if no such recipient exists.
    pub async fn unsubscribe(&self, email: &str) -> Result<bool> {
        match self.backend.get_recipient(email).await? {
            None => {
                warn!(email, "unsubscribe: no such recipient");
                Ok(false)
            }
            Some(recipient) if !recipient.is_active() => {
                info!(email, "unsubscribe: already unsubscribed");
                Ok(true)
            }
            Some(_) => {
                let update = RecipientUpdate {
                    status: Some(RecipientStatus::Unsubscribed),
                    unsubscribed_at: Some(Some(now_rfc3339())),
                    ..Default::default()
                };
                let updated = self.backend.update_recipient(email, &update).await?;
                if updated {
                    info!(email, "recipient unsubscribed");
                }
                Ok(updated)
            }
        }
    }

    /// Reactivate an unsubscribed recipient, clearing `unsubscribed_at`.
    /// Returns `false` if no such recipient exists.
    pub async fn resubscribe(&self, email: &str) -> Result<bool> {
        match self.backend.get_recipient(email).await? {
            None => {
                warn!(email, "resubscribe: no such recipient");
                Ok(false)
            }
            Some(recipient) if recipient.is_active() => {
                info!(email, "resubscribe: already active");
                Ok(true)
            }
            Some(_) => {
                let update = RecipientUpdate {
                    status: Some(RecipientStatus::Active),
                    unsubscribed_at: Some(None),
                    ..Default::default()
                };
                let updated = self.backend.update_recipient(email, &update).await?;
                if updated {
                    info!(email, "recipient resubscribed");
                }
                Ok(updated)
            }
        }
    }

    /// Hard delete — the unsubscribe-link flow removes the record entirely
    /// rather than flagging it. Returns `false` if nothing existed.
    pub async fn delete(&self, email: &str) -> Result<bool> {
        let removed = self.backend.delete_recipient(email).await?;
        info!(email, removed, "recipient hard-deleted");
        Ok(removed)
    }
}
