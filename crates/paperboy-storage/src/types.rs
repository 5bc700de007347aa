use std::fmt;

use serde::{Deserialize, Serialize};

use paperboy_core::config::MAX_ERROR_CHARS;
use paperboy_core::Mode;

/// Subscription state of a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    #[default]
    Active,
    Unsubscribed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Active => "active",
            RecipientStatus::Unsubscribed => "unsubscribed",
        }
    }
}

impl fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecipientStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecipientStatus::Active),
            "unsubscribed" => Ok(RecipientStatus::Unsubscribed),
            other => Err(format!("unknown recipient status: {}", other)),
        }
    }
}

/// One delivery-list member.
///
/// Invariant: `unsubscribed_at` is set iff `status` is `Unsubscribed`. The
/// transitions in `paperboy-recipients` maintain this; the storage layer
/// persists whatever it is handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// Unique identifier. Format-validated at registration, not here.
    pub email: String,
    pub name: String,
    pub status: RecipientStatus,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp, present only while unsubscribed.
    pub unsubscribed_at: Option<String>,
    /// `YYYY-MM-DD` of the most recent successful delivery.
    pub last_delivery_date: Option<String>,
}

impl Recipient {
    pub fn is_active(&self) -> bool {
        self.status == RecipientStatus::Active
    }
}

/// Partial update for a recipient row.
///
/// Outer `None` leaves a field untouched; `Some(None)` on the nullable
/// fields clears them. `Default` touches nothing.
#[derive(Debug, Clone, Default)]
pub struct RecipientUpdate {
    pub name: Option<String>,
    pub status: Option<RecipientStatus>,
    pub unsubscribed_at: Option<Option<String>>,
    pub last_delivery_date: Option<Option<String>>,
}

impl RecipientUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.unsubscribed_at.is_none()
            && self.last_delivery_date.is_none()
    }
}

/// The idempotency key: one allowed execution slot per day per mode.
pub fn execution_key(date: &str, mode: Mode) -> String {
    format!("{}#{}", date, mode)
}

/// One claimed execution slot. Written once via the conditional insert,
/// never mutated, expired via TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// `{date}#{mode}`, see [`execution_key`].
    pub execution_key: String,
    /// KST calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub mode: Mode,
    /// Opaque caller identifier (scheduler request id, CLI run id).
    pub request_id: String,
    /// RFC3339 UTC instant the slot was claimed.
    pub execution_time: String,
    /// Expiry instant, UTC epoch seconds.
    pub ttl: i64,
}

/// Per-day failure counter backing the circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// KST calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub failure_count: i64,
    /// Most recent error message, clipped to 500 chars.
    pub last_error: Option<String>,
    /// RFC3339 UTC instant of the most recent increment.
    pub updated_at: Option<String>,
    /// Expiry instant, UTC epoch seconds.
    pub ttl: Option<i64>,
}

/// Clip an error message to the storable length without splitting a
/// multibyte character.
pub fn clip_error(msg: &str) -> String {
    msg.chars().take(MAX_ERROR_CHARS).collect()
}
