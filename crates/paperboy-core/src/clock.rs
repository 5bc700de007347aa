use chrono::{Duration, FixedOffset, NaiveDate, Utc};

use crate::error::{CoreError, Result};

/// The job's calendar day is Korea Standard Time (UTC+9). A run triggered at
/// 23:30 UTC and its retry at 00:10 UTC land on the same KST date, which is
/// exactly what the idempotency key needs.
const KST_OFFSET_SECS: i32 = 9 * 3600;

fn kst() -> FixedOffset {
    // In range for a fixed offset, so this never fails.
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap()
}

/// Today's calendar date in KST, formatted `YYYY-MM-DD`.
pub fn today_kst() -> String {
    Utc::now().with_timezone(&kst()).format("%Y-%m-%d").to_string()
}

/// Current instant as an RFC3339 UTC timestamp string.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Current instant as UTC epoch seconds.
pub fn epoch_now() -> i64 {
    Utc::now().timestamp()
}

/// Expiry instant `days` days from now, as UTC epoch seconds.
///
/// Transient records (execution log, failure log) carry this so they
/// self-expire without a garbage collector.
pub fn ttl_epoch(days: i64) -> i64 {
    (Utc::now() + Duration::days(days)).timestamp()
}

/// Validate a user-supplied `YYYY-MM-DD` date string.
pub fn validate_date(date: &str) -> Result<()> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| CoreError::InvalidDate(date.to_string()))
}
