use chime::config::SchedulerConfig;
use chime::dispatch::WorkerPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn core_workers_are_prestarted() {
    let config = SchedulerConfig::builder().workers_count(8).build();
    let pool = WorkerPool::start(&config);
    assert_eq!(pool.live_workers(), config.core_pool_size());
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn submitted_jobs_all_run() {
    let pool = WorkerPool::start(&SchedulerConfig::default());
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let counter = counter.clone();
        pool.submit(Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;
    }

    pool.shutdown(Duration::from_secs(2)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn backlog_grows_the_pool_past_its_core_size() {
    let config = SchedulerConfig::builder()
        .workers_count(8)
        .work_queue_size(1)
        .build();
    let pool = WorkerPool::start(&config);
    let core = config.core_pool_size();

    for _ in 0..(core + 3) {
        pool.submit(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }))
        .await;
    }

    assert!(
        pool.live_workers() > core,
        "a backed-up queue should have started burst workers"
    );
    pool.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn shutdown_aborts_workers_past_the_deadline() {
    let pool = WorkerPool::start(&SchedulerConfig::default());
    pool.submit(Box::pin(async move {
        tokio::time::sleep(Duration::from_secs(600)).await;
    }))
    .await;
    // give a worker the chance to pick the job up
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(3), pool.shutdown(Duration::from_millis(200)))
        .await
        .expect("shutdown must stay within its bound");
}

#[tokio::test]
async fn jobs_after_shutdown_are_dropped() {
    let pool = WorkerPool::start(&SchedulerConfig::default());
    pool.shutdown(Duration::from_secs(1)).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let cloned = counter.clone();
    pool.submit(Box::pin(async move {
        cloned.fetch_add(1, Ordering::SeqCst);
    }))
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
