pub mod system_clock;
pub mod virtual_clock;

pub use system_clock::SystemClock;
pub use virtual_clock::VirtualClock;

use crate::utils::system_time_to_millis;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

/// [`SchedulerClock`] is a trait for implementing a custom scheduler clock,
/// typical operations include getting the current time and idling until a
/// specific instant of interest is reached.
///
/// # Required Methods
/// When implementing the [`SchedulerClock`], one must provide implementations
/// for two methods, those being [`SchedulerClock::now`] and
/// [`SchedulerClock::idle_to`]. Both methods are used by the
/// [`Scheduler`](crate::scheduler::Scheduler) timing loop under the hood
///
/// # Trait Implementation(s)
/// There are two noteworthy implementations:
///
/// - [`SystemClock`] the default go-to clock, it automatically goes forward
///   and idles on real wall-clock time
/// - [`VirtualClock`] used to simulate time (for unit tests, simulations and
///   debugging), it doesn't move forward without explicit advancing and
///   implements the [`AdvanceableSchedulerClock`] extension trait
///
/// # See Also
/// - [`SystemClock`]
/// - [`VirtualClock`]
/// - [`AdvanceableSchedulerClock`]
#[async_trait]
pub trait SchedulerClock: Debug + Send + Sync + 'static {
    /// Gets the current time of the clock represented as [`SystemTime`]
    async fn now(&self) -> SystemTime;

    /// Idle until the specified time is reached (if it is in the past or
    /// present, it doesn't idle). The future must be cancellation-safe, the
    /// timing loop races it against its wake-up channel
    async fn idle_to(&self, to: SystemTime);

    /// Gets the current time of the clock as milliseconds since the UNIX
    /// epoch, which is the representation the scheduler bookkeeping uses
    async fn now_millis(&self) -> u64 {
        system_time_to_millis(self.now().await)
    }
}

/// [`AdvanceableSchedulerClock`] is an optional extension to
/// [`SchedulerClock`] which, as the name suggests, allows for arbitrary
/// advancement of time. Real clocks cannot be advanced, as such why it is an
/// optional trait implemented only by [`VirtualClock`]
#[async_trait]
pub trait AdvanceableSchedulerClock: SchedulerClock {
    /// Advance the time by a specified duration forward, it acts similar in
    /// spirit to [`AdvanceableSchedulerClock::advance_to`] (in fact it uses
    /// this method under the hood), but for durations
    async fn advance(&self, duration: Duration) {
        let now = self.now().await;
        self.advance_to(now + duration).await
    }

    /// Advance the time to a specified desired future point of time, waking
    /// any idlers whose target has now been reached
    async fn advance_to(&self, to: SystemTime);
}
