use std::error::Error;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// An opaque application failure raised by a [`Task`](crate::task::Task)
/// while it runs. The scheduler never inspects it beyond walking its
/// ``source()`` chain for bookkeeping, as such it stays fully type-erased
pub type TaskError = Arc<dyn Error + Send + Sync + 'static>;

/// [`ChimeErrors`] is the main enum that contains all the errors which can be
/// thrown by chime, it uses under the hood [`thiserror`] to make it as smooth
/// sailing to add more errors in the future as possible
///
/// The taxonomy splits into caller-visible creation failures
/// ([`ChimeErrors::InvalidCronExpression`], [`ChimeErrors::DuplicateSchedule`],
/// [`ChimeErrors::TaskUnresolvable`]), store-level failures surfaced from the
/// transactional layer ([`ChimeErrors::ScheduleNotFound`],
/// [`ChimeErrors::TransientConflict`]) and record codec failures. Run-time
/// task failures never appear here, they are recorded on the schedule's
/// counters instead
#[derive(Error, Debug)]
pub enum ChimeErrors {
    /// This error is meant to happen when a cron expression fails to parse
    /// against the five/six-field cron grammar, it surfaces synchronously at
    /// schedule-creation time and is never retried
    #[error("Invalid cron expression `{0}`: {1}")]
    InvalidCronExpression(String, String),

    /// This error is meant to happen when creating a schedule whose identity
    /// is already taken in the durable store
    #[error("A schedule with the identity `{0}` already exists")]
    DuplicateSchedule(Uuid),

    #[error("No schedule with the identity `{0}` exists")]
    ScheduleNotFound(Uuid),

    /// An optimistic-concurrency conflict detected at commit time. Callers
    /// retry the same transaction content up to three times before treating
    /// it as fatal
    #[error("Transactional conflict on record `{0}`")]
    TransientConflict(String),

    /// Supplied task reference is non-existent in the current [`TaskRegistry`](crate::task::TaskRegistry)
    #[error("No task is registered under the reference `{0}`")]
    TaskUnresolvable(String),

    #[error("Failed to serialize record `{0}`: {1}")]
    Serialization(String, String),

    #[error("Failed to deserialize record `{0}`: {1}")]
    Deserialization(String, String),
}
