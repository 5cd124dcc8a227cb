use async_trait::async_trait;
use chime::clock::{AdvanceableSchedulerClock, VirtualClock};
use chime::errors::{ChimeErrors, TaskError};
use chime::scheduler::{RunAt, Scheduler};
use chime::store::MemoryStore;
use chime::task::Task;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

struct CountingTask {
    runs: Arc<AtomicU64>,
}

#[async_trait]
impl Task for CountingTask {
    async fn run(&self) -> Result<(), TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingTask {
    runs: Arc<AtomicU64>,
}

#[async_trait]
impl Task for FailingTask {
    async fn run(&self) -> Result<(), TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(Arc::new(std::io::Error::other("boom")))
    }
}

struct HangingTask {
    started: Arc<AtomicBool>,
}

#[async_trait]
impl Task for HangingTask {
    async fn run(&self) -> Result<(), TaskError> {
        self.started.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(())
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn counting_scheduler(store: MemoryStore) -> (Scheduler<MemoryStore, VirtualClock>, Arc<AtomicU64>) {
    let runs = Arc::new(AtomicU64::new(0));
    let scheduler = Scheduler::builder()
        .store(store)
        .clock(VirtualClock::from_epoch())
        .build();
    scheduler
        .registry()
        .register("count", Arc::new(CountingTask { runs: runs.clone() }));
    (scheduler, runs)
}

#[tokio::test]
async fn cron_schedule_fires_on_every_recurrence() {
    let (scheduler, runs) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();
    let handle = scheduler.schedule_cron("count", "* * * * * *").await.unwrap();

    for firing in 1..=3u64 {
        scheduler.clock().advance(Duration::from_secs(1)).await;
        eventually("the next firing", || runs.load(Ordering::SeqCst) >= firing).await;
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    let state = scheduler.schedule_state(handle.id()).await.unwrap();
    assert!(!state.is_done());
    assert!(!state.is_cancelled());
    scheduler.stop().await;
}

#[tokio::test]
async fn one_shot_fires_once_then_completes() {
    let (scheduler, runs) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();
    let handle = scheduler
        .schedule_once("count", RunAt::At(5_000))
        .await
        .unwrap();

    scheduler.clock().advance(Duration::from_secs(5)).await;
    eventually("the one-shot firing", || runs.load(Ordering::SeqCst) == 1).await;

    // completion is flagged in the reschedule transaction, before the firing
    // was even handed to a worker
    let state = scheduler.schedule_state(handle.id()).await.unwrap();
    assert!(state.is_done());
    assert!(!state.is_cancelled());
    assert_eq!(state.next_fire(), None);

    // nothing further happens no matter how far time moves
    scheduler.clock().advance(Duration::from_secs(60)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    scheduler.stop().await;
}

#[tokio::test]
async fn delayed_one_shot_resolves_against_the_clock() {
    let (scheduler, runs) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();
    scheduler
        .schedule_once("count", RunAt::After(Duration::from_secs(2)))
        .await
        .unwrap();

    scheduler.clock().advance(Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    scheduler.clock().advance(Duration::from_secs(1)).await;
    eventually("the delayed firing", || runs.load(Ordering::SeqCst) == 1).await;
    scheduler.stop().await;
}

#[tokio::test]
async fn cancelled_schedule_never_runs_its_task() {
    let (scheduler, runs) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();
    let handle = scheduler
        .schedule_once("count", RunAt::At(2_000))
        .await
        .unwrap();

    scheduler.cancel_schedule(handle.id()).await.unwrap();
    scheduler.clock().advance(Duration::from_secs(10)).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    let state = scheduler.schedule_state(handle.id()).await.unwrap();
    assert!(state.is_cancelled());
    assert!(!state.is_done());
    assert_eq!(state.next_fire(), None);
    scheduler.stop().await;
}

#[tokio::test]
async fn failing_task_is_counted_and_keeps_its_recurrence() {
    let runs = Arc::new(AtomicU64::new(0));
    let scheduler = Scheduler::builder()
        .store(MemoryStore::new())
        .clock(VirtualClock::from_epoch())
        .build();
    scheduler
        .registry()
        .register("flaky", Arc::new(FailingTask { runs: runs.clone() }));
    scheduler.start().await.unwrap();
    let handle = scheduler.schedule_cron("flaky", "* * * * * *").await.unwrap();

    for firing in 1..=2u64 {
        scheduler.clock().advance(Duration::from_secs(1)).await;
        eventually("the next failing firing", || {
            runs.load(Ordering::SeqCst) >= firing
        })
        .await;
    }

    // the runner commits its bookkeeping after the task returns, poll the
    // persisted state until it lands
    let id = *handle.id();
    let mut state = scheduler.schedule_state(&id).await.unwrap();
    for _ in 0..500 {
        if state.execution_counter() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        state = scheduler.schedule_state(&id).await.unwrap();
    }
    assert_eq!(state.execution_counter(), 2);
    assert_eq!(state.exception_counter(), 2);
    assert!(!state.is_done());
    assert!(!state.is_cancelled());
    scheduler.stop().await;
}

#[tokio::test]
async fn missed_recurrences_are_recorded_not_replayed() {
    let (scheduler, runs) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();
    let handle = scheduler.schedule_cron("count", "* * * * * *").await.unwrap();

    // jump over three fire instants at once
    scheduler.clock().advance(Duration::from_millis(3_500)).await;
    eventually("the single catch-up firing", || {
        runs.load(Ordering::SeqCst) == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let state = scheduler.schedule_state(handle.id()).await.unwrap();
    assert!(state.overrun() >= 1);
    scheduler.stop().await;
}

#[tokio::test]
async fn persisted_schedules_survive_a_restart() {
    let store = MemoryStore::new();
    let (first_life, _) = counting_scheduler(store.clone());
    let handle = first_life
        .schedule_once("count", RunAt::At(10_000))
        .await
        .unwrap();
    drop(first_life);

    let (second_life, runs) = counting_scheduler(store);
    second_life.start().await.unwrap();
    second_life.clock().advance(Duration::from_secs(10)).await;
    eventually("the restored schedule to fire", || {
        runs.load(Ordering::SeqCst) == 1
    })
    .await;

    let state = second_life.schedule_state(handle.id()).await.unwrap();
    assert!(state.is_done());
    second_life.stop().await;
}

#[tokio::test]
async fn creation_failures_surface_synchronously() {
    let (scheduler, _) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();

    let err = scheduler
        .schedule_once("unregistered", RunAt::At(1_000))
        .await
        .unwrap_err();
    assert!(matches!(err, ChimeErrors::TaskUnresolvable(_)));

    let err = scheduler.schedule_cron("count", "nope").await.unwrap_err();
    assert!(matches!(err, ChimeErrors::InvalidCronExpression(..)));

    let err = scheduler.cancel_schedule(&Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ChimeErrors::ScheduleNotFound(_)));

    assert!(!scheduler.remove_schedule(&Uuid::new_v4()).await.unwrap());
    scheduler.stop().await;
}

#[tokio::test]
async fn removal_forgets_the_schedule_entirely() {
    let (scheduler, runs) = counting_scheduler(MemoryStore::new());
    scheduler.start().await.unwrap();
    let handle = scheduler
        .schedule_once("count", RunAt::At(2_000))
        .await
        .unwrap();

    assert!(scheduler.remove_schedule(handle.id()).await.unwrap());
    scheduler.clock().advance(Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    let err = scheduler.schedule_state(handle.id()).await.unwrap_err();
    assert!(matches!(err, ChimeErrors::ScheduleNotFound(_)));
    scheduler.stop().await;
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let (scheduler, _) = counting_scheduler(MemoryStore::new());
    assert!(!scheduler.is_running().await);

    scheduler.start().await.unwrap();
    scheduler.start().await.unwrap();
    assert!(scheduler.is_running().await);

    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn stop_stays_bounded_with_a_hanging_task() {
    let started = Arc::new(AtomicBool::new(false));
    let scheduler = Scheduler::builder()
        .store(MemoryStore::new())
        .clock(VirtualClock::from_epoch())
        .build();
    scheduler.registry().register(
        "hang",
        Arc::new(HangingTask {
            started: started.clone(),
        }),
    );
    scheduler.start().await.unwrap();
    scheduler
        .schedule_once("hang", RunAt::At(1_000))
        .await
        .unwrap();

    scheduler.clock().advance(Duration::from_secs(1)).await;
    eventually("the hanging task to start", || started.load(Ordering::SeqCst)).await;

    tokio::time::timeout(Duration::from_secs(8), scheduler.stop())
        .await
        .expect("stop must stay within its shutdown bound");
    assert!(!scheduler.is_running().await);
}
