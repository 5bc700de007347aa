use rusqlite::{Connection, Result};

/// Initialise all tables for the embedded backend. Safe to call on every
/// startup — CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_recipients_table(conn)?;
    create_failures_table(conn)?;
    create_execution_table(conn)?;
    Ok(())
}

fn create_recipients_table(conn: &Connection) -> Result<()> {
    // idx_recipients_status mirrors the managed backend's status GSI.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS recipients (
            email              TEXT PRIMARY KEY NOT NULL,
            name               TEXT NOT NULL,
            status             TEXT NOT NULL DEFAULT 'active',
            created_at         TEXT NOT NULL,
            unsubscribed_at    TEXT,
            last_delivery_date TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_recipients_status
            ON recipients(status);",
    )
}

fn create_failures_table(conn: &Connection) -> Result<()> {
    // ttl is epoch seconds; expired rows are deleted lazily on read.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS delivery_failures (
            date          TEXT PRIMARY KEY NOT NULL,
            failure_count INTEGER NOT NULL DEFAULT 0,
            last_error    TEXT,
            updated_at    TEXT,
            ttl           INTEGER
        );",
    )
}

fn create_execution_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS execution_log (
            execution_key  TEXT PRIMARY KEY NOT NULL,
            date           TEXT NOT NULL,
            mode           TEXT NOT NULL,
            request_id     TEXT,
            execution_time TEXT,
            ttl            INTEGER
        );",
    )
}
