use crate::config::SchedulerConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// How long [`WorkerPool::shutdown`] waits for in-flight jobs before
/// forcing termination
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// A unit of work submitted to the pool, already bound to everything it
/// needs to run
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// [`WorkerPool`] is the bounded execution side of the scheduler, fully
/// decoupled from the timing loop: once a job is submitted the loop moves on
/// and never blocks on its completion.
///
/// # Implementation Detail(s)
/// Jobs travel over a bounded queue sized from
/// [`SchedulerConfig::work_queue_size`]. A core set of workers
/// ([`SchedulerConfig::core_pool_size`]) is pre-started with the pool; when
/// the queue backs up, burst workers are started on demand up to
/// [`SchedulerConfig::max_pool_size`], after which submission applies
/// backpressure
///
/// # Usage Note(s)
/// A hang inside a job blocks one worker slot, never the timing loop.
/// [`WorkerPool::shutdown`] drains gracefully for up to the given bound and
/// aborts whatever is still running after it
///
/// # See Also
/// - [`SchedulerConfig`]
/// - [`Scheduler`](crate::scheduler::Scheduler)
pub struct WorkerPool {
    job_tx: Mutex<Option<mpsc::Sender<Job>>>,
    job_rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    live: Arc<AtomicUsize>,
    max_pool_size: usize,
}

impl WorkerPool {
    /// Creates / Constructs a [`WorkerPool`] sized from ``config`` with all
    /// of its core workers already started
    pub fn start(config: &SchedulerConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.work_queue_size.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let live = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(config.core_pool_size());
        for _ in 0..config.core_pool_size() {
            workers.push(Self::spawn_worker(job_rx.clone(), live.clone()));
        }
        tracing::debug!(
            core = config.core_pool_size(),
            max = config.max_pool_size(),
            queue = config.work_queue_size,
            "worker pool started"
        );
        Self {
            job_tx: Mutex::new(Some(job_tx)),
            job_rx,
            workers: Mutex::new(workers),
            live,
            max_pool_size: config.max_pool_size(),
        }
    }

    fn spawn_worker(job_rx: Arc<Mutex<mpsc::Receiver<Job>>>, live: Arc<AtomicUsize>) -> JoinHandle<()> {
        live.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                // hold the receiver lock only for the handoff, never while
                // the job runs
                let job = { job_rx.lock().await.recv().await };
                match job {
                    Some(job) => job.await,
                    None => break,
                }
            }
            live.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Submits a job for execution. When the queue is full a burst worker is
    /// started (bounded by the pool's maximum size), after which the call
    /// applies backpressure until a slot frees up. Jobs submitted after
    /// shutdown are dropped with a log line
    pub async fn submit(&self, job: Job) {
        let job_tx = self.job_tx.lock().await.as_ref().cloned();
        let Some(job_tx) = job_tx else {
            tracing::warn!("job submitted after pool shutdown, dropping it");
            return;
        };
        match job_tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                if self.live.load(Ordering::SeqCst) < self.max_pool_size {
                    let handle = Self::spawn_worker(self.job_rx.clone(), self.live.clone());
                    self.workers.lock().await.push(handle);
                    tracing::debug!("work queue full, started a burst worker");
                }
                if job_tx.send(job).await.is_err() {
                    tracing::warn!("pool closed while backpressured, job dropped");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("pool closed, job dropped");
            }
        }
    }

    /// Number of currently live workers
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Orderly shutdown: closes the job queue so workers drain and exit,
    /// waits up to ``wait`` in total for them, then aborts any worker still
    /// busy past the deadline. Failures here are logged, never re-raised
    pub async fn shutdown(&self, wait: Duration) {
        self.job_tx.lock().await.take();
        let deadline = tokio::time::Instant::now() + wait;
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let abort = worker.abort_handle();
            match tokio::time::timeout(remaining, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if !err.is_cancelled() {
                        tracing::error!(%err, "worker exited abnormally");
                    }
                }
                Err(_) => {
                    abort.abort();
                    tracing::warn!("worker still busy at the shutdown deadline, aborting it");
                }
            }
        }
        tracing::debug!("worker pool shut down");
    }
}
