use chime::cron::CronEvaluator;
use chime::errors::ChimeErrors;
use chrono::{TimeZone, Utc};

#[test]
fn accepts_five_six_and_seven_field_forms() {
    assert!(CronEvaluator::is_valid("0 12 * * *"));
    assert!(CronEvaluator::is_valid("*/30 0 12 * * *"));
    assert!(CronEvaluator::is_valid("0 0 0 1 1 * 2099"));
    assert!(CronEvaluator::is_valid("0 0 9-17 * * MON-FRI"));
    assert!(CronEvaluator::is_valid("0 15,45 * * * *"));
}

#[test]
fn rejects_malformed_expressions() {
    assert!(!CronEvaluator::is_valid("not a cron"));
    assert!(!CronEvaluator::is_valid("1 2 3"));
    assert!(!CronEvaluator::is_valid("* * * * * * * *"));
    assert!(!CronEvaluator::is_valid("99 * * * *"));
}

#[test]
fn first_run_after_reports_the_parse_failure() {
    let err = CronEvaluator::first_run_after("1 2 3", 0).unwrap_err();
    assert!(matches!(err, ChimeErrors::InvalidCronExpression(..)));
}

#[test]
fn advance_is_strict_on_exact_fire_instants() {
    // every second
    let expr = "* * * * * *";
    assert_eq!(CronEvaluator::first_run_after(expr, 999).unwrap(), Some(1000));
    // landing exactly on a fire instant yields the following one
    assert_eq!(CronEvaluator::first_run_after(expr, 1000).unwrap(), Some(2000));
    assert_eq!(CronEvaluator::first_run_after(expr, 1001).unwrap(), Some(2000));
}

#[test]
fn five_field_form_gets_zero_seconds() {
    // every 5 minutes, fire instants land on exact minute boundaries
    let next = CronEvaluator::first_run_after("*/5 * * * *", 0).unwrap();
    assert_eq!(next, Some(5 * 60 * 1000));
}

#[test]
fn lists_and_ranges_evaluate() {
    let next = CronEvaluator::first_run_after("0 15,45 * * * *", 0).unwrap();
    assert_eq!(next, Some(15 * 60 * 1000));
    let after_first = CronEvaluator::first_run_after("0 15,45 * * * *", 15 * 60 * 1000).unwrap();
    assert_eq!(after_first, Some(45 * 60 * 1000));
}

#[test]
fn exhausted_expression_never_fires_again() {
    let past = Utc
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .unwrap()
        .timestamp_millis() as u64;
    // a fixed instant in 1999 has no occurrence left after 2026
    let next = CronEvaluator::first_run_after("0 0 0 1 1 * 1999", past).unwrap();
    assert_eq!(next, None);
}
