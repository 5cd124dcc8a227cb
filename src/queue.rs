use crate::schedule::ScheduleId;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A transient, comparable-by-time pairing of a schedule identity and its
/// next fire instant (milliseconds since the UNIX epoch). The total order is
/// by fire time with the identity as tie-break, so draining a
/// [`TimingQueue`] is fully deterministic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub due: u64,
    pub id: ScheduleId,
}

impl Ord for ScheduleTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScheduleTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// [`TimingQueue`] is the in-memory ordered set of pending fire times the
/// engine's timing loop works off. It is deliberately not synchronized: the
/// timing loop owns it exclusively and all external mutation travels over
/// the engine's signal channel, so no lock ever guards the structure itself
///
/// # Usage Note(s)
/// Entries are reconstructed from the persisted schedules at startup, the
/// queue itself is never the source of truth. A stale entry (its schedule
/// cancelled or removed since insertion) is harmless, the loop drops it on
/// pop when the entity lookup comes back inert
///
/// # See Also
/// - [`ScheduleTime`]
/// - [`Scheduler`](crate::scheduler::Scheduler)
#[derive(Debug, Default)]
pub struct TimingQueue {
    entries: BTreeSet<ScheduleTime>,
}

impl TimingQueue {
    /// Creates / Constructs a new empty [`TimingQueue`] instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returns ``false`` when the exact pairing was
    /// already present
    pub fn insert(&mut self, entry: ScheduleTime) -> bool {
        self.entries.insert(entry)
    }

    /// The earliest entry by fire time without removing it
    pub fn peek_earliest(&self) -> Option<ScheduleTime> {
        self.entries.first().copied()
    }

    /// Removes and returns the earliest entry by fire time
    pub fn remove_earliest(&mut self) -> Option<ScheduleTime> {
        self.entries.pop_first()
    }

    /// Drops every entry belonging to ``id``, returns how many were dropped
    pub fn remove_id(&mut self, id: &ScheduleId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != *id);
        before - self.entries.len()
    }

    /// How long the timing loop should wait before re-evaluating: ``0`` when
    /// the earliest entry is already due at ``now``, the remaining delta when
    /// it is pending, and ``empty_poll`` when the queue is empty (a bounded
    /// poll keeps the loop responsive to wake-up signals)
    pub fn wait_millis(&self, now: u64, empty_poll: u64) -> u64 {
        match self.peek_earliest() {
            None => empty_poll,
            Some(earliest) => earliest.due.saturating_sub(now),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
