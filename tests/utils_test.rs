use chime::utils::{format_millis, millis_to_date_time, millis_to_system_time, system_time_to_millis};
use chrono::{DateTime, Utc};
use std::time::{Duration, UNIX_EPOCH};

#[test]
fn millis_and_system_time_round_trip() {
    assert_eq!(system_time_to_millis(millis_to_system_time(1_234_567)), 1_234_567);
    assert_eq!(system_time_to_millis(UNIX_EPOCH), 0);
    // instants before the epoch clamp to zero
    assert_eq!(
        system_time_to_millis(UNIX_EPOCH - Duration::from_secs(1)),
        0
    );
}

#[test]
fn out_of_range_instants_saturate_instead_of_panicking() {
    assert_eq!(millis_to_date_time(u64::MAX), DateTime::<Utc>::MAX_UTC);
    assert_eq!(millis_to_date_time(i64::MAX as u64), DateTime::<Utc>::MAX_UTC);
}

#[test]
fn formatting_yields_rfc3339() {
    assert_eq!(format_millis(0), "1970-01-01T00:00:00+00:00");
    assert!(format_millis(1_500).starts_with("1970-01-01T00:00:01.5"));
}
