use crate::clock::SchedulerClock;
use async_trait::async_trait;
use std::time::SystemTime;

/// [`SystemClock`] is the default implementation of the [`SchedulerClock`]
/// trait, it reads real wall-clock time and idles via the tokio timer.
///
/// # Usage Note(s)
/// Being tied to the operating system clock, it is unsuitable for unit tests
/// that want to simulate the passage of time, for those cases
/// [`VirtualClock`](crate::clock::VirtualClock) should be preferred
///
/// # See Also
/// - [`SchedulerClock`]
/// - [`VirtualClock`](crate::clock::VirtualClock)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl SchedulerClock for SystemClock {
    async fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn idle_to(&self, to: SystemTime) {
        if let Ok(wait) = to.duration_since(SystemTime::now()) {
            tokio::time::sleep(wait).await;
        }
    }
}
