use chrono::{DateTime, Utc};

// ============== Timestamp Helpers ==============

/// Storage representation of a timestamp (unix millis).
pub fn unix_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`unix_millis`]; out-of-range values collapse to the epoch.
pub fn from_unix_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// `now`, truncated to the precision the store keeps.
pub fn now_millis_precision() -> DateTime<Utc> {
    from_unix_millis(unix_millis(Utc::now()))
}
