use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, info};

use paperboy_core::clock::epoch_now;
use paperboy_core::config::SQLITE_BUSY_TIMEOUT_MS;

use crate::backend::StorageBackend;
use crate::db::init_db;
use crate::error::{Result, StorageError};
use crate::types::{
    clip_error, ExecutionRecord, FailureRecord, Recipient, RecipientStatus, RecipientUpdate,
};

/// Embedded file-backed storage.
///
/// A single SQLite connection behind a `Mutex`. WAL keeps concurrent readers
/// from blocking the writer when several job invocations overlap, and the
/// busy timeout bounds how long a caller waits on a stalled writer.
///
/// TTL is emulated: expired execution/failure rows are deleted lazily on
/// read, so a record may linger on disk for a short window between its
/// expiry instant and the next read.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (creating the parent directory and schema as needed) the
    /// database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL; PRAGMA busy_timeout={}; PRAGMA foreign_keys=ON;",
            SQLITE_BUSY_TIMEOUT_MS
        ))?;
        init_db(&conn)?;
        info!(path, "sqlite backend opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests and throwaway runs. No journal pragmas —
    /// there is no file to journal.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete rows whose emulated TTL has passed. Called under the
    /// connection lock before every read of a TTL-carrying table.
    fn cleanup_expired(conn: &Connection, table: &str) -> Result<()> {
        let now = epoch_now();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE ttl IS NOT NULL AND ttl < ?1", table),
            rusqlite::params![now],
        )?;
        if deleted > 0 {
            debug!(table, deleted, "lazily deleted expired rows");
        }
        Ok(())
    }
}

const RECIPIENT_SELECT: &str =
    "SELECT email, name, status, created_at, unsubscribed_at, last_delivery_date
     FROM recipients";

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get_recipient(&self, email: &str) -> Result<Option<Recipient>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("{} WHERE email = ?1", RECIPIENT_SELECT),
            rusqlite::params![email],
            row_to_recipient,
        ) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    async fn put_recipient(&self, recipient: &Recipient) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO recipients
             (email, name, status, created_at, unsubscribed_at, last_delivery_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                recipient.email,
                recipient.name,
                recipient.status.as_str(),
                recipient.created_at,
                recipient.unsubscribed_at,
                recipient.last_delivery_date,
            ],
        )?;
        info!(email = %recipient.email, "recipient stored");
        Ok(())
    }

    async fn query_recipients_by_status(
        &self,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = ?1 ORDER BY created_at DESC",
            RECIPIENT_SELECT
        ))?;
        let rows = stmt.query_map(rusqlite::params![status.as_str()], row_to_recipient)?;
        let recipients: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        info!(%status, count = recipients.len(), "recipients queried by status");
        Ok(recipients)
    }

    async fn get_all_recipients(&self) -> Result<Vec<Recipient>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at DESC", RECIPIENT_SELECT))?;
        let rows = stmt.query_map([], row_to_recipient)?;
        let recipients: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        info!(count = recipients.len(), "all recipients listed");
        Ok(recipients)
    }

    async fn update_recipient(&self, email: &str, update: &RecipientUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(true);
        }

        let mut set_clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &update.name {
            set_clauses.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(status) = &update.status {
            set_clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(unsubscribed_at) = &update.unsubscribed_at {
            set_clauses.push("unsubscribed_at = ?");
            values.push(opt_text(unsubscribed_at));
        }
        if let Some(last_delivery_date) = &update.last_delivery_date {
            set_clauses.push("last_delivery_date = ?");
            values.push(opt_text(last_delivery_date));
        }
        values.push(Value::Text(email.to_string()));

        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE recipients SET {} WHERE email = ?",
            set_clauses.join(", ")
        );
        let changed = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        info!(email, changed, "recipient updated");
        Ok(changed > 0)
    }

    async fn delete_recipient(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM recipients WHERE email = ?1",
            rusqlite::params![email],
        )?;
        info!(email, removed = changed > 0, "recipient deleted");
        Ok(changed > 0)
    }

    async fn get_execution(&self, execution_key: &str) -> Result<Option<ExecutionRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::cleanup_expired(&conn, "execution_log")?;
        match conn.query_row(
            "SELECT execution_key, date, mode, request_id, execution_time, ttl
             FROM execution_log WHERE execution_key = ?1",
            rusqlite::params![execution_key],
            row_to_execution,
        ) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    async fn put_execution(&self, record: &ExecutionRecord) -> Result<bool> {
        // INSERT OR IGNORE is the native conditional insert: on a key
        // collision no row changes and `changes()` stays 0.
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO execution_log
             (execution_key, date, mode, request_id, execution_time, ttl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.execution_key,
                record.date,
                record.mode.as_str(),
                record.request_id,
                record.execution_time,
                record.ttl,
            ],
        )?;
        let inserted = changed > 0;
        info!(key = %record.execution_key, inserted, "execution slot write");
        Ok(inserted)
    }

    async fn delete_execution(&self, execution_key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM execution_log WHERE execution_key = ?1",
            rusqlite::params![execution_key],
        )?;
        info!(key = execution_key, removed = changed > 0, "execution slot deleted");
        Ok(changed > 0)
    }

    async fn get_failure(&self, date: &str) -> Result<Option<FailureRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::cleanup_expired(&conn, "delivery_failures")?;
        match conn.query_row(
            "SELECT date, failure_count, last_error, updated_at, ttl
             FROM delivery_failures WHERE date = ?1",
            rusqlite::params![date],
            row_to_failure,
        ) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    async fn increment_failure(&self, date: &str, error: &str) -> Result<i64> {
        let error = clip_error(error);
        let now = paperboy_core::clock::now_rfc3339();
        let ttl = paperboy_core::clock::ttl_epoch(paperboy_core::config::RECORD_TTL_DAYS);

        // Single-statement atomic upsert; RETURNING reads the post-increment
        // count inside the same statement.
        let conn = self.conn.lock().unwrap();
        let new_count: i64 = conn.query_row(
            "INSERT INTO delivery_failures (date, failure_count, last_error, updated_at, ttl)
             VALUES (?1, 1, ?2, ?3, ?4)
             ON CONFLICT(date) DO UPDATE SET
                 failure_count = failure_count + 1,
                 last_error    = excluded.last_error,
                 updated_at    = excluded.updated_at,
                 ttl           = excluded.ttl
             RETURNING failure_count",
            rusqlite::params![date, error, now, ttl],
            |row| row.get(0),
        )?;
        info!(date, new_count, "failure count incremented");
        Ok(new_count)
    }

    async fn delete_failure(&self, date: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM delivery_failures WHERE date = ?1",
            rusqlite::params![date],
        )?;
        info!(date, removed = changed > 0, "failure record deleted");
        Ok(changed > 0)
    }
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

/// Map a SELECT row (column order from RECIPIENT_SELECT) to a Recipient.
fn row_to_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    let status: String = row.get(2)?;
    Ok(Recipient {
        email: row.get(0)?,
        name: row.get(1)?,
        status: status.parse().unwrap_or_default(),
        created_at: row.get(3)?,
        unsubscribed_at: row.get(4)?,
        last_delivery_date: row.get(5)?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let mode: String = row.get(2)?;
    Ok(ExecutionRecord {
        execution_key: row.get(0)?,
        date: row.get(1)?,
        mode: mode.parse().unwrap_or_default(),
        request_id: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        execution_time: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        ttl: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
    })
}

fn row_to_failure(row: &rusqlite::Row<'_>) -> rusqlite::Result<FailureRecord> {
    Ok(FailureRecord {
        date: row.get(0)?,
        failure_count: row.get(1)?,
        last_error: row.get(2)?,
        updated_at: row.get(3)?,
        ttl: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use paperboy_core::clock::{epoch_now, now_rfc3339, ttl_epoch};
    use paperboy_core::Mode;

    use super::*;
    use crate::types::execution_key;

    fn recipient(email: &str) -> Recipient {
        Recipient {
            email: email.to_string(),
            name: "Tester".to_string(),
            status: RecipientStatus::Active,
            created_at: now_rfc3339(),
            unsubscribed_at: None,
            last_delivery_date: None,
        }
    }

    fn execution(key_date: &str, mode: Mode, ttl: i64) -> ExecutionRecord {
        ExecutionRecord {
            execution_key: execution_key(key_date, mode),
            date: key_date.to_string(),
            mode,
            request_id: "req-1".to_string(),
            execution_time: now_rfc3339(),
            ttl,
        }
    }

    #[tokio::test]
    async fn recipient_crud_roundtrip() {
        let backend = SqliteBackend::open_in_memory().unwrap();

        backend.put_recipient(&recipient("a@x.com")).await.unwrap();
        let got = backend.get_recipient("a@x.com").await.unwrap().unwrap();
        assert_eq!(got.name, "Tester");
        assert!(got.is_active());

        assert!(backend.delete_recipient("a@x.com").await.unwrap());
        assert!(backend.get_recipient("a@x.com").await.unwrap().is_none());
        assert!(!backend.delete_recipient("a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn query_by_status_filters() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put_recipient(&recipient("a@x.com")).await.unwrap();
        let mut unsubbed = recipient("b@x.com");
        unsubbed.status = RecipientStatus::Unsubscribed;
        unsubbed.unsubscribed_at = Some(now_rfc3339());
        backend.put_recipient(&unsubbed).await.unwrap();

        let active = backend
            .query_recipients_by_status(RecipientStatus::Active)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].email, "a@x.com");
        assert_eq!(backend.get_all_recipients().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_clears_and_leaves_fields() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut r = recipient("a@x.com");
        r.status = RecipientStatus::Unsubscribed;
        r.unsubscribed_at = Some(now_rfc3339());
        backend.put_recipient(&r).await.unwrap();

        // Clear unsubscribed_at, flip status, leave name untouched.
        let update = RecipientUpdate {
            status: Some(RecipientStatus::Active),
            unsubscribed_at: Some(None),
            ..Default::default()
        };
        assert!(backend.update_recipient("a@x.com", &update).await.unwrap());

        let got = backend.get_recipient("a@x.com").await.unwrap().unwrap();
        assert!(got.is_active());
        assert!(got.unsubscribed_at.is_none());
        assert_eq!(got.name, "Tester");
    }

    #[tokio::test]
    async fn update_missing_recipient_reports_false() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let update = RecipientUpdate {
            last_delivery_date: Some(Some("2026-01-27".to_string())),
            ..Default::default()
        };
        assert!(!backend.update_recipient("ghost@x.com", &update).await.unwrap());
    }

    #[tokio::test]
    async fn put_execution_is_conditional() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let record = execution("2026-01-27", Mode::Opr, ttl_epoch(7));

        assert!(backend.put_execution(&record).await.unwrap());
        // Same key, different request: untouched, reports the collision.
        let mut rival = record.clone();
        rival.request_id = "req-2".to_string();
        assert!(!backend.put_execution(&rival).await.unwrap());

        let stored = backend
            .get_execution(&record.execution_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.request_id, "req-1");
    }

    #[tokio::test]
    async fn concurrent_put_execution_yields_one_winner() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let a = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                let mut record = execution("2026-01-27", Mode::Opr, ttl_epoch(7));
                record.request_id = "req-a".to_string();
                backend.put_execution(&record).await.unwrap()
            })
        };
        let b = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                let mut record = execution("2026-01-27", Mode::Opr, ttl_epoch(7));
                record.request_id = "req-b".to_string();
                backend.put_execution(&record).await.unwrap()
            })
        };
        let mut results = vec![a.await.unwrap(), b.await.unwrap()];
        results.sort();
        assert_eq!(results, vec![false, true]);
    }

    #[tokio::test]
    async fn expired_execution_is_absent() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let record = execution("2026-01-20", Mode::Opr, epoch_now() - 60);
        assert!(backend.put_execution(&record).await.unwrap());
        assert!(backend
            .get_execution(&record.execution_key)
            .await
            .unwrap()
            .is_none());
        // The slot is free again after expiry.
        assert!(backend.put_execution(&record).await.unwrap());
    }

    #[tokio::test]
    async fn increment_failure_counts_up_and_resets() {
        let backend = SqliteBackend::open_in_memory().unwrap();

        assert_eq!(backend.increment_failure("2026-01-27", "timeout").await.unwrap(), 1);
        assert_eq!(
            backend
                .increment_failure("2026-01-27", "login failed")
                .await
                .unwrap(),
            2
        );
        // A different date starts its own count.
        assert_eq!(backend.increment_failure("2026-01-28", "timeout").await.unwrap(), 1);

        let stored = backend.get_failure("2026-01-27").await.unwrap().unwrap();
        assert_eq!(stored.failure_count, 2);
        assert_eq!(stored.last_error.as_deref(), Some("login failed"));

        assert!(backend.delete_failure("2026-01-27").await.unwrap());
        assert!(backend.get_failure("2026-01-27").await.unwrap().is_none());
        assert!(!backend.delete_failure("2026-01-27").await.unwrap());
    }

    #[tokio::test]
    async fn increment_failure_clips_long_messages() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let long = "x".repeat(2000);
        backend.increment_failure("2026-01-27", &long).await.unwrap();
        let stored = backend.get_failure("2026-01-27").await.unwrap().unwrap();
        assert_eq!(stored.last_error.unwrap().chars().count(), 500);
    }

    #[tokio::test]
    async fn expired_failure_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paperboy.db");
        let backend = SqliteBackend::open(path.to_str().unwrap()).unwrap();
        backend.increment_failure("2026-01-20", "timeout").await.unwrap();

        // Force the ttl into the past through a second connection.
        let side = Connection::open(&path).unwrap();
        side.execute(
            "UPDATE delivery_failures SET ttl = ?1 WHERE date = '2026-01-20'",
            rusqlite::params![epoch_now() - 60],
        )
        .unwrap();

        assert!(backend.get_failure("2026-01-20").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/paperboy.db");
        let backend = SqliteBackend::open(path.to_str().unwrap()).unwrap();
        backend.put_recipient(&recipient("a@x.com")).await.unwrap();
        assert!(path.exists());
    }
}
