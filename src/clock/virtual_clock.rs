use crate::clock::{AdvanceableSchedulerClock, SchedulerClock};
use crate::utils::millis_to_date_time;
use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

/// [`VirtualClock`] is an implementation of the [`SchedulerClock`] trait, it
/// acts as a mock object, allowing to simulate time without the waiting
/// around. This is especially useful for unit tests and simulations
///
/// Unlike [`SystemClock`](crate::clock::SystemClock), this clock doesn't move
/// forward on its own, rather it needs explicit calls to the advance methods
/// ([`VirtualClock`] implements the [`AdvanceableSchedulerClock`] extension
/// trait), which makes it predictable at any point throughout the program
///
/// # Constructor(s)
/// When constructing a [`VirtualClock`], one can use a variety of
/// constructor methods, those being:
/// - [`VirtualClock::new`] For creating one from an initial [`SystemTime`]
/// - [`VirtualClock::from_value`] For creating one from a ``u64`` number of
///   milliseconds since the UNIX epoch
/// - [`VirtualClock::from_current_time`] For creating one from the current time
/// - [`VirtualClock::from_epoch`] For creating one set to the UNIX epoch
///
/// # See Also
/// - [`SystemClock`](crate::clock::SystemClock)
/// - [`AdvanceableSchedulerClock`]
/// - [`SchedulerClock`]
pub struct VirtualClock {
    current_time: AtomicU64,
    notify: Notify,
}

impl Debug for VirtualClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field(
                "current_time",
                &millis_to_date_time(self.current_time.load(Ordering::Relaxed)),
            )
            .finish()
    }
}

impl VirtualClock {
    /// Creates / Constructs a new [`VirtualClock`] instance with the time set
    /// to the provided ``initial_time``
    pub fn new(initial_time: SystemTime) -> Self {
        VirtualClock::from_value(
            initial_time
                .duration_since(UNIX_EPOCH)
                .map(|dur| dur.as_millis() as u64)
                .unwrap_or(0),
        )
    }

    /// Creates / Constructs a new [`VirtualClock`] instance with the time set
    /// to ``initial_value``, represented in **total milliseconds** since the
    /// UNIX epoch
    pub fn from_value(initial_value: u64) -> Self {
        VirtualClock {
            current_time: AtomicU64::new(initial_value),
            notify: Notify::new(),
        }
    }

    /// Creates / Constructs a new [`VirtualClock`] instance from the current time
    pub fn from_current_time() -> Self {
        Self::new(SystemTime::now())
    }

    /// Creates / Constructs a new [`VirtualClock`] instance from the UNIX epoch
    pub fn from_epoch() -> Self {
        Self::new(UNIX_EPOCH)
    }
}

#[async_trait]
impl AdvanceableSchedulerClock for VirtualClock {
    async fn advance_to(&self, to: SystemTime) {
        let to_millis = to
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_millis() as u64)
            .unwrap_or(0);
        self.current_time.fetch_max(to_millis, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl SchedulerClock for VirtualClock {
    async fn now(&self) -> SystemTime {
        let now = self.current_time.load(Ordering::SeqCst);
        UNIX_EPOCH + Duration::from_millis(now)
    }

    async fn idle_to(&self, to: SystemTime) {
        loop {
            // register before re-checking so an advance between the check
            // and the await is never lost
            let notified = self.notify.notified();
            if self.now().await >= to {
                return;
            }
            notified.await;
        }
    }
}
