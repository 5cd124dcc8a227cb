use chime::clock::{AdvanceableSchedulerClock, SchedulerClock, VirtualClock};
use std::time::{Duration, UNIX_EPOCH};

#[tokio::test]
async fn starts_at_the_configured_instant_and_stays_there() {
    let clock = VirtualClock::from_value(1500);
    assert_eq!(clock.now_millis().await, 1500);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(clock.now_millis().await, 1500);
}

#[tokio::test]
async fn advance_moves_time_forward() {
    let clock = VirtualClock::from_epoch();
    clock.advance(Duration::from_secs(2)).await;
    assert_eq!(clock.now_millis().await, 2000);
    assert_eq!(clock.now().await, UNIX_EPOCH + Duration::from_secs(2));
}

#[tokio::test]
async fn advance_to_never_regresses() {
    let clock = VirtualClock::from_value(5000);
    clock.advance_to(UNIX_EPOCH + Duration::from_secs(1)).await;
    assert_eq!(clock.now_millis().await, 5000);
}

#[tokio::test]
async fn idle_to_wakes_once_time_is_reached() {
    let clock = std::sync::Arc::new(VirtualClock::from_epoch());

    let idler = {
        let clock = clock.clone();
        tokio::spawn(async move {
            clock.idle_to(UNIX_EPOCH + Duration::from_secs(3)).await;
        })
    };

    // a partial advance must not release the idler
    clock.advance(Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!idler.is_finished());

    clock.advance(Duration::from_secs(2)).await;
    tokio::time::timeout(Duration::from_secs(1), idler)
        .await
        .expect("idler should wake after the full advance")
        .unwrap();
}

#[tokio::test]
async fn idle_to_a_past_instant_returns_immediately() {
    let clock = VirtualClock::from_value(10_000);
    tokio::time::timeout(
        Duration::from_millis(100),
        clock.idle_to(UNIX_EPOCH + Duration::from_secs(5)),
    )
    .await
    .expect("idling to the past must not block");
}
