use typed_builder::TypedBuilder;

/// Default bound on the worker pool's pending-job queue
pub const DEFAULT_WORK_QUEUE_SIZE: usize = 10;

/// Default upper bound (in milliseconds) on any single idle of the timing
/// loop before it re-evaluates its queue
pub const DEFAULT_IDLE_WAIT_MILLIS: u64 = 1000;

/// How long (in milliseconds) the timing loop waits between polls while its
/// queue is empty, bounded so it stays responsive to wake-up signals
pub const EMPTY_QUEUE_POLL_MILLIS: u64 = 100;

fn default_workers_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

/// This is the injected configuration of a
/// [`Scheduler`](crate::scheduler::Scheduler) instance, every knob is
/// optional and defaulted.
///
/// # Construction
/// Built via [`SchedulerConfig::builder`] (a typed builder, every parameter
/// method can be set at most once) or [`SchedulerConfig::default`]
///
/// # Example
/// ```ignore
/// use chime::config::SchedulerConfig;
///
/// let config = SchedulerConfig::builder()
///     .workers_count(8)
///     .work_queue_size(32)
///     .build();
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct SchedulerConfig {
    /// Sizing basis for the worker pool, defaults to the number of
    /// available cores. The pool derives its pre-started core size and its
    /// burst ceiling from this via [`SchedulerConfig::core_pool_size`] and
    /// [`SchedulerConfig::max_pool_size`]
    #[builder(default = default_workers_count())]
    pub workers_count: usize,

    /// Capacity of the bounded pending-job queue between the timing loop
    /// and the workers, defaults to [`DEFAULT_WORK_QUEUE_SIZE`]
    #[builder(default = DEFAULT_WORK_QUEUE_SIZE)]
    pub work_queue_size: usize,

    /// Upper bound in milliseconds on any single idle of the timing loop,
    /// defaults to [`DEFAULT_IDLE_WAIT_MILLIS`]. The loop re-evaluates its
    /// queue at least this often even when nothing wakes it
    #[builder(default = DEFAULT_IDLE_WAIT_MILLIS)]
    pub idle_wait_millis: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SchedulerConfig {
    /// Number of workers pre-started when the pool is built:
    /// ``clamp(workers_count / 4 + 1, 2, 20)``
    pub fn core_pool_size(&self) -> usize {
        (self.workers_count / 4 + 1).clamp(2, 20)
    }

    /// Ceiling on concurrently live workers: ``min(workers_count, 200)``,
    /// never below the core size
    pub fn max_pool_size(&self) -> usize {
        self.workers_count.min(200).max(self.core_pool_size())
    }
}
