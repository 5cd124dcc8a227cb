use chrono::{DateTime, TimeZone, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Converts a ``SystemTime`` to milliseconds since the UNIX epoch. Instants
/// before the epoch clamp to zero, the scheduler never fires in the past
pub fn system_time_to_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts milliseconds since the UNIX epoch back to a ``SystemTime``
pub fn millis_to_system_time(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Converts milliseconds since the UNIX epoch to a UTC ``DateTime``, it is
/// used internally wherever calendar math happens (cron evaluation and
/// human-readable presentation). Instants past the representable calendar
/// range saturate at the maximum datetime
pub fn millis_to_date_time(millis: u64) -> DateTime<Utc> {
    let millis = i64::try_from(millis).unwrap_or(i64::MAX);
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Formats milliseconds since the UNIX epoch as an RFC 3339 timestamp
pub fn format_millis(millis: u64) -> String {
    millis_to_date_time(millis).to_rfc3339()
}
