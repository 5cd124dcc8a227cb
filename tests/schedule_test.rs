use chime::errors::ChimeErrors;
use chime::schedule::{Recurrence, Schedule};

#[test]
fn one_shot_fires_only_strictly_after_from() {
    let schedule = Schedule::once("job", 5000);
    assert_eq!(schedule.next_run(0), Some(5000));
    assert_eq!(schedule.next_run(4999), Some(5000));
    // the fire instant itself and anything past it yield nothing
    assert_eq!(schedule.next_run(5000), None);
    assert_eq!(schedule.next_run(5001), None);
}

#[test]
fn cron_schedule_never_fires_before_its_start() {
    let schedule = Schedule::cron("job", "* * * * * *", 10_000).unwrap();
    assert_eq!(schedule.next_run(0), Some(11_000));
    assert_eq!(schedule.next_run(10_000), Some(11_000));
    assert_eq!(schedule.next_run(11_500), Some(12_000));
}

#[test]
fn cron_constructor_validates_the_expression() {
    let err = Schedule::cron("job", "so wrong", 0).unwrap_err();
    assert!(matches!(err, ChimeErrors::InvalidCronExpression(..)));
}

#[test]
fn fresh_schedule_has_inert_bookkeeping() {
    let schedule = Schedule::once("job", 1000);
    assert_eq!(schedule.start(), 1000);
    assert!(!schedule.is_cancelled());
    assert!(!schedule.is_running());
    assert!(!schedule.is_done());
    assert!(schedule.is_one_shot());
    assert_eq!(schedule.execution_counter(), 0);
    assert_eq!(schedule.exception_counter(), 0);
    assert_eq!(schedule.overrun(), 0);
    assert_eq!(schedule.next_fire(), None);
}

#[test]
fn completion_hooks_update_the_counters() {
    let mut schedule = Schedule::cron("job", "* * * * *", 0).unwrap();

    schedule.task_starting();
    assert!(schedule.is_running());
    schedule.task_completed_successfully();
    assert!(!schedule.is_running());
    assert_eq!(schedule.execution_counter(), 1);
    assert_eq!(schedule.exception_counter(), 0);

    let err = std::io::Error::other("boom");
    schedule.task_starting();
    schedule.task_completed_with_exception(&err);
    assert!(!schedule.is_running());
    assert_eq!(schedule.execution_counter(), 2);
    assert_eq!(schedule.exception_counter(), 1);
}

#[test]
fn recurrence_is_reported_in_the_presentation() {
    let once = Schedule::once("job", 42);
    assert!(once.presentation_string().starts_with("once at "));
    assert!(matches!(once.recurrence(), Recurrence::Once { run_at: 42 }));

    let cron = Schedule::cron("job", "0 0 2 * * *", 0).unwrap();
    assert_eq!(cron.presentation_string(), "cron `0 0 2 * * *`");
    assert!(!cron.is_one_shot());
}
