use crate::clock::SchedulerClock;
use crate::config::{EMPTY_QUEUE_POLL_MILLIS, SchedulerConfig};
use crate::dispatch::{SHUTDOWN_WAIT, WorkerPool};
use crate::errors::ChimeErrors;
use crate::queue::{ScheduleTime, TimingQueue};
use crate::runner::TaskRunner;
use crate::schedule::{Schedule, ScheduleId};
use crate::store::{DurableStore, MAX_TX_ATTEMPTS, ScheduleStore, StoreTransaction};
use crate::task::TaskRegistry;
use crate::utils::millis_to_system_time;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use typed_builder::TypedBuilder;

/// An opaque reference to a schedule handed back by
/// [`Scheduler::schedule_once`] and [`Scheduler::schedule_cron`], used for
/// later cancellation or removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleHandle {
    id: ScheduleId,
}

impl ScheduleHandle {
    pub fn id(&self) -> &ScheduleId {
        &self.id
    }
}

/// When a one-shot schedule should fire: after a delay from now, or at an
/// absolute instant (milliseconds since the UNIX epoch)
#[derive(Debug, Clone, Copy)]
pub enum RunAt {
    After(Duration),
    At(u64),
}

/// Wake-up signals travelling from the public API into the timing loop. The
/// loop owns the [`TimingQueue`] exclusively, external mutation only ever
/// arrives through this channel
enum EngineSignal {
    Insert(ScheduleTime),
    Forget(ScheduleId),
}

/// This is the builder parts to use for building a [`Scheduler`] instance.
/// By itself it should not be used, it resides behind [`Scheduler::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = Scheduler<S, C>))]
pub struct SchedulerParts<S: DurableStore, C: SchedulerClock> {
    /// The [`DurableStore`] every schedule mutation is persisted through
    store: S,

    /// The [`SchedulerClock`] the timing loop reads and idles on. For unit
    /// testing and simulations prefer
    /// [`VirtualClock`](crate::clock::VirtualClock) over the default
    /// wall-clock behavior
    clock: C,

    /// The [`TaskRegistry`] resolving stored task references to concrete
    /// tasks, empty by default
    #[builder(default = Arc::new(TaskRegistry::new()))]
    registry: Arc<TaskRegistry>,

    /// The worker pool and timing knobs, see [`SchedulerConfig`]
    #[builder(default)]
    config: SchedulerConfig,
}

impl<S: DurableStore, C: SchedulerClock> From<SchedulerParts<S, C>> for Scheduler<S, C> {
    fn from(parts: SchedulerParts<S, C>) -> Self {
        Self {
            store: Arc::new(parts.store),
            clock: Arc::new(parts.clock),
            registry: parts.registry,
            config: parts.config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            signal_tx: Mutex::new(None),
            process: Mutex::new(None),
            pool: Mutex::new(None),
        }
    }
}

/// [`Scheduler`] is the durable task scheduler: it persists schedule
/// definitions through a [`DurableStore`], keeps an in-memory
/// [`TimingQueue`] of pending fire times, and dispatches due firings to a
/// bounded [`WorkerPool`].
///
/// The main loop, hosted on a dedicated timing task, consists of in a
/// nutshell:
/// 1. Draining externally submitted queue entries.
/// 2. Idling until the earliest entry's fire time is reached (waking early
///    when a new schedule arrives or shutdown is requested).
/// 3. Popping the entry and transactionally recomputing + re-inserting the
///    schedule's next fire time (a vanished or cancelled entity is dropped,
///    that is the designed cancellation path).
/// 4. Submitting a [`TaskRunner`] for the firing to the worker pool and
///    moving straight on, task execution never blocks the loop.
///
/// # Constructor(s)
/// Construct via [`Scheduler::builder`], supplying at minimum a store and a
/// clock:
///
/// ```ignore
/// use chime::scheduler::Scheduler;
/// use chime::store::MemoryStore;
/// use chime::clock::SystemClock;
///
/// let scheduler = Scheduler::builder()
///     .store(MemoryStore::new())
///     .clock(SystemClock)
///     .build();
///
/// scheduler.registry().register("emit-report", my_task);
/// scheduler.start().await?;
/// let handle = scheduler.schedule_cron("emit-report", "0 0 2 * * *").await?;
/// scheduler.cancel_schedule(handle.id()).await?;
/// scheduler.stop().await;
/// ```
///
/// # Usage Note(s)
/// Callers see synchronous failures only for validation (cron grammar,
/// unknown task reference) and duplicate identities; every run-time task
/// failure is visible solely through the schedule's counters and hooks
///
/// # See Also
/// - [`SchedulerConfig`]
/// - [`DurableStore`]
/// - [`SchedulerClock`]
/// - [`WorkerPool`]
pub struct Scheduler<S: DurableStore, C: SchedulerClock> {
    store: Arc<S>,
    clock: Arc<C>,
    registry: Arc<TaskRegistry>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    signal_tx: Mutex<Option<mpsc::UnboundedSender<EngineSignal>>>,
    process: Mutex<Option<JoinHandle<()>>>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
}

impl<S: DurableStore, C: SchedulerClock> Scheduler<S, C> {
    /// Constructs a scheduler builder, used for supplying the store, clock,
    /// registry and configuration that compose a [`Scheduler`]
    pub fn builder() -> SchedulerPartsBuilder<S, C> {
        SchedulerParts::builder()
    }

    /// The registry resolving stored task references, register tasks here
    /// before scheduling them
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The clock the timing loop runs off. Mostly of interest with a
    /// [`VirtualClock`](crate::clock::VirtualClock), whose advance methods
    /// drive simulated time forward
    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    /// Checks if the scheduler has been started and not yet stopped
    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// Starts the scheduler: builds the worker pool with its core workers
    /// pre-started, spawns the timing task, then loads every persisted
    /// active, non-cancelled, non-done schedule and seeds the timing queue
    /// with its computed next fire time. Starting an already started
    /// scheduler does nothing
    pub async fn start(&self) -> Result<(), ChimeErrors> {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return Ok(());
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(WorkerPool::start(&self.config));
        let mut queue = TimingQueue::new();

        let now = self.clock.now_millis().await;
        let mut tx = self.store.begin("load persisted schedules").await;
        let mut persisted = Vec::new();
        ScheduleStore::for_each_active(&mut tx, |schedule| persisted.push(schedule)).await;
        tx.rollback().await;
        for schedule in persisted {
            if schedule.is_cancelled() || schedule.is_done() {
                continue;
            }
            if let Some(due) = schedule.next_run(now) {
                queue.insert(ScheduleTime { due, id: *schedule.id() });
            }
        }
        tracing::info!(pending = queue.len(), "scheduler starting");

        self.running.store(true, Ordering::SeqCst);
        *self.signal_tx.lock().await = Some(signal_tx);
        *self.pool.lock().await = Some(pool.clone());
        *process = Some(tokio::spawn(engine_loop(
            self.store.clone(),
            self.clock.clone(),
            self.registry.clone(),
            pool,
            self.running.clone(),
            self.shutdown.clone(),
            queue,
            signal_rx,
            self.config.idle_wait_millis,
        )));
        Ok(())
    }

    /// Stops the scheduler: wakes and joins the timing task, then shuts the
    /// worker pool down, draining in-flight firings for a bounded wait
    /// before forcing termination. Shutdown failures are logged, never
    /// re-raised. Stopping an already stopped scheduler does nothing
    pub async fn stop(&self) {
        let handle = self.process.lock().await.take();
        let Some(handle) = handle else { return };
        tracing::info!("scheduler stopping");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        if let Err(err) = handle.await
            && !err.is_cancelled()
        {
            tracing::error!(%err, "timing loop exited abnormally");
        }
        *self.signal_tx.lock().await = None;
        if let Some(pool) = self.pool.lock().await.take() {
            pool.shutdown(SHUTDOWN_WAIT).await;
        }
        tracing::info!("scheduler stopped");
    }

    /// Persists a one-shot schedule binding ``task_ref`` and firing once at
    /// the instant ``when`` resolves to
    ///
    /// # Returns
    /// Fails synchronously with [`ChimeErrors::TaskUnresolvable`] when
    /// nothing is registered under ``task_ref`` and with
    /// [`ChimeErrors::DuplicateSchedule`] on an identity collision
    pub async fn schedule_once(
        &self,
        task_ref: impl Into<String>,
        when: RunAt,
    ) -> Result<ScheduleHandle, ChimeErrors> {
        let task_ref = task_ref.into();
        if !self.registry.contains(&task_ref) {
            return Err(ChimeErrors::TaskUnresolvable(task_ref));
        }
        let now = self.clock.now_millis().await;
        let run_at = match when {
            RunAt::After(delay) => now + delay.as_millis() as u64,
            RunAt::At(instant) => instant,
        };
        self.persist_new(Schedule::once(task_ref, run_at)).await
    }

    /// Persists a recurring cron schedule binding ``task_ref``, starting
    /// from the current clock instant. See
    /// [`Scheduler::schedule_cron_starting`] for an explicit start
    pub async fn schedule_cron(
        &self,
        task_ref: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<ScheduleHandle, ChimeErrors> {
        let start = self.clock.now_millis().await;
        self.schedule_cron_starting(task_ref, expression, start).await
    }

    /// Persists a recurring cron schedule that never fires before the
    /// ``start`` instant (milliseconds since the UNIX epoch)
    ///
    /// # Returns
    /// Fails synchronously with [`ChimeErrors::InvalidCronExpression`] when
    /// the expression doesn't parse, with [`ChimeErrors::TaskUnresolvable`]
    /// when nothing is registered under ``task_ref`` and with
    /// [`ChimeErrors::DuplicateSchedule`] on an identity collision
    pub async fn schedule_cron_starting(
        &self,
        task_ref: impl Into<String>,
        expression: impl Into<String>,
        start: u64,
    ) -> Result<ScheduleHandle, ChimeErrors> {
        let task_ref = task_ref.into();
        if !self.registry.contains(&task_ref) {
            return Err(ChimeErrors::TaskUnresolvable(task_ref));
        }
        self.persist_new(Schedule::cron(task_ref, expression, start)?)
            .await
    }

    /// Cancels a schedule: the entity is flagged cancelled and its identity
    /// moves to the cancelled registry set, all within one transaction. Any
    /// queue entry still pending for it dies at the next pop; its task is
    /// never invoked again
    pub async fn cancel_schedule(&self, id: &ScheduleId) -> Result<(), ChimeErrors> {
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let mut tx = self.store.begin("cancel schedule").await;
            match ScheduleStore::cancel(&mut tx, id).await {
                Err(err) => {
                    tx.rollback().await;
                    return Err(err);
                }
                Ok(_) => match tx.commit().await {
                    Ok(()) => break,
                    Err(ChimeErrors::TransientConflict(key)) if attempt < MAX_TX_ATTEMPTS => {
                        tracing::warn!(%id, key, attempt, "cancel hit a transient conflict, replaying");
                    }
                    Err(err) => return Err(err),
                },
            }
        }
        if let Some(signal_tx) = self.signal_tx.lock().await.as_ref() {
            let _ = signal_tx.send(EngineSignal::Forget(*id));
        }
        tracing::info!(%id, "schedule cancelled");
        Ok(())
    }

    /// Physically removes a schedule from the store and both registry sets
    ///
    /// # Returns
    /// ``Ok(false)`` when no schedule with that identity existed
    pub async fn remove_schedule(&self, id: &ScheduleId) -> Result<bool, ChimeErrors> {
        let mut removed = false;
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let mut tx = self.store.begin("remove schedule").await;
            removed = ScheduleStore::remove(&mut tx, id).await;
            match tx.commit().await {
                Ok(()) => break,
                Err(ChimeErrors::TransientConflict(key)) if attempt < MAX_TX_ATTEMPTS => {
                    tracing::warn!(%id, key, attempt, "removal hit a transient conflict, replaying");
                }
                Err(err) => return Err(err),
            }
        }
        if removed && let Some(signal_tx) = self.signal_tx.lock().await.as_ref() {
            let _ = signal_tx.send(EngineSignal::Forget(*id));
        }
        Ok(removed)
    }

    /// Loads the current persisted state of a schedule, counters included
    pub async fn schedule_state(&self, id: &ScheduleId) -> Result<Schedule, ChimeErrors> {
        let mut tx = self.store.begin("inspect schedule").await;
        let schedule = ScheduleStore::get(&mut tx, id).await;
        tx.rollback().await;
        schedule
    }

    async fn persist_new(&self, mut schedule: Schedule) -> Result<ScheduleHandle, ChimeErrors> {
        let now = self.clock.now_millis().await;
        schedule.set_next_fire(schedule.next_run(now));
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let mut tx = self.store.begin("schedule task").await;
            if let Err(err) = ScheduleStore::create(&mut tx, &schedule).await {
                tx.rollback().await;
                return Err(err);
            }
            match tx.commit().await {
                Ok(()) => break,
                Err(ChimeErrors::TransientConflict(key)) if attempt < MAX_TX_ATTEMPTS => {
                    tracing::warn!(id = %schedule.id(), key, attempt, "creation hit a transient conflict, replaying");
                }
                Err(err) => return Err(err),
            }
        }
        tracing::info!(id = %schedule.id(), "scheduled {}", schedule.presentation_string());
        self.dispatch_for_execution(&schedule).await;
        Ok(ScheduleHandle {
            id: *schedule.id(),
        })
    }

    /// Hands a freshly persisted schedule to the timing loop. Sending on the
    /// signal channel is itself the wake-up: the loop races the channel
    /// against its idle, so a schedule due sooner than whatever it was
    /// sleeping on gets picked up immediately
    async fn dispatch_for_execution(&self, schedule: &Schedule) {
        let now = self.clock.now_millis().await;
        let Some(due) = schedule.next_run(now) else {
            return;
        };
        if let Some(signal_tx) = self.signal_tx.lock().await.as_ref() {
            let _ = signal_tx.send(EngineSignal::Insert(ScheduleTime {
                due,
                id: *schedule.id(),
            }));
        }
    }
}

fn apply_signal(queue: &mut TimingQueue, signal: EngineSignal) {
    match signal {
        EngineSignal::Insert(entry) => {
            queue.insert(entry);
        }
        EngineSignal::Forget(id) => {
            queue.remove_id(&id);
        }
    }
}

/// The timing loop. It owns the [`TimingQueue`] exclusively, every external
/// mutation arrives over ``signals``; waking early out of an idle is the
/// designed signal that something may now be due sooner, never an error
#[allow(clippy::too_many_arguments)]
async fn engine_loop<S: DurableStore, C: SchedulerClock>(
    store: Arc<S>,
    clock: Arc<C>,
    registry: Arc<TaskRegistry>,
    pool: Arc<WorkerPool>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    mut queue: TimingQueue,
    mut signals: mpsc::UnboundedReceiver<EngineSignal>,
    idle_wait_millis: u64,
) {
    while running.load(Ordering::SeqCst) {
        while let Ok(signal) = signals.try_recv() {
            apply_signal(&mut queue, signal);
        }
        let now = clock.now_millis().await;
        match queue.peek_earliest() {
            Some(earliest) if earliest.due <= now => {
                if let Some(entry) = queue.remove_earliest() {
                    let (submit, next) = reschedule_fired(store.as_ref(), clock.as_ref(), &entry).await;
                    if let Some(next_entry) = next {
                        queue.insert(next_entry);
                    }
                    if submit {
                        let runner = TaskRunner::new(entry.id, store.clone(), registry.clone());
                        let id = entry.id;
                        pool.submit(Box::pin(async move {
                            if let Err(err) = runner.execute().await {
                                tracing::error!(%id, %err, "task runner failed to commit its bookkeeping");
                            }
                        }))
                        .await;
                    }
                }
            }
            Some(earliest) => {
                tokio::select! {
                    _ = clock.idle_to(millis_to_system_time(earliest.due)) => {}
                    _ = tokio::time::sleep(Duration::from_millis(idle_wait_millis)) => {}
                    signal = signals.recv() => {
                        if let Some(signal) = signal {
                            apply_signal(&mut queue, signal);
                        }
                    }
                    _ = shutdown.notified() => {}
                }
            }
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(EMPTY_QUEUE_POLL_MILLIS)) => {}
                    signal = signals.recv() => {
                        if let Some(signal) = signal {
                            apply_signal(&mut queue, signal);
                        }
                    }
                    _ = shutdown.notified() => {}
                }
            }
        }
    }
    tracing::debug!("timing loop exited");
}

/// Transactionally recomputes a fired schedule's next run and persists it,
/// replaying on transient conflicts up to [`MAX_TX_ATTEMPTS`] times
///
/// # Returns
/// ``(submit, next)``: whether this firing should be handed to the worker
/// pool, and the queue entry for the following fire time, if any. A missing,
/// cancelled or done entity yields ``(false, None)``, that is the implicit
/// cancellation path
async fn reschedule_fired<S: DurableStore, C: SchedulerClock>(
    store: &S,
    clock: &C,
    entry: &ScheduleTime,
) -> (bool, Option<ScheduleTime>) {
    for attempt in 1..=MAX_TX_ATTEMPTS {
        let mut tx = store.begin("reschedule fired task").await;
        let mut schedule = match ScheduleStore::try_get(&mut tx, &entry.id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                tx.rollback().await;
                tracing::debug!(id = %entry.id, "schedule vanished, implicit cancellation");
                return (false, None);
            }
            Err(err) => {
                tx.rollback().await;
                tracing::error!(id = %entry.id, %err, "cannot load fired schedule, dropping the entry");
                return (false, None);
            }
        };
        if schedule.is_cancelled() || schedule.is_done() {
            tx.rollback().await;
            return (false, None);
        }

        let now = clock.now_millis().await;
        if let Some(missed) = schedule.next_run(entry.due)
            && missed <= now
        {
            schedule.record_overrun();
        }
        let next = schedule.next_run(now);
        schedule.set_next_fire(next);
        if next.is_none() {
            schedule.mark_done();
        }
        if let Err(err) = ScheduleStore::save(&mut tx, &schedule) {
            tx.rollback().await;
            tracing::error!(id = %entry.id, %err, "cannot persist rescheduled state");
            return (false, None);
        }
        match tx.commit().await {
            Ok(()) => {
                return (
                    true,
                    next.map(|due| ScheduleTime { due, id: entry.id }),
                );
            }
            Err(ChimeErrors::TransientConflict(key)) if attempt < MAX_TX_ATTEMPTS => {
                tracing::warn!(id = %entry.id, key, attempt, "reschedule hit a transient conflict, replaying");
            }
            Err(err) => {
                tracing::error!(id = %entry.id, %err, "reschedule failed, dropping this firing");
                return (false, None);
            }
        }
    }
    (false, None)
}
