pub mod memory;

pub use memory::MemoryStore;

use crate::errors::ChimeErrors;
use crate::schedule::{Schedule, ScheduleId};
use async_trait::async_trait;
use serde_json::Value;

/// How many times callers replay a transaction that failed with
/// [`ChimeErrors::TransientConflict`] before surfacing it as fatal
pub const MAX_TX_ATTEMPTS: u32 = 3;

const SCHEDULE_KEY_PREFIX: &str = "schedule::";
const ACTIVE_SET_KEY: &str = "schedules::active";
const CANCELLED_SET_KEY: &str = "schedules::cancelled";

/// [`DurableStore`] is the key-value persistence seam the scheduler consumes.
/// All schedule mutations happen inside a [`StoreTransaction`] (unit of
/// work), a batch of reads and writes that commits or rolls back as one
///
/// # Required Method(s)
/// When implementing the [`DurableStore`], one has to supply an associated
/// transaction type and an implementation for [`DurableStore::begin`]. The
/// ``usecase`` tag names the unit of work for observability, it carries no
/// semantics
///
/// # Trait Implementation(s)
/// [`MemoryStore`] is the provided implementation, an in-memory versioned
/// record table with optimistic concurrency
///
/// # See Also
/// - [`StoreTransaction`]
/// - [`MemoryStore`]
#[async_trait]
pub trait DurableStore: Send + Sync + 'static {
    type Tx: StoreTransaction;

    async fn begin(&self, usecase: &str) -> Self::Tx;
}

/// [`StoreTransaction`] is a scoped, atomic group of record reads and writes
/// over JSON values. Writes are buffered until [`StoreTransaction::commit`];
/// dropping or rolling back discards them. A commit may fail with
/// [`ChimeErrors::TransientConflict`] when another transaction touched a
/// record this one read, callers replay up to [`MAX_TX_ATTEMPTS`] times
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads the record under ``key``, observing writes buffered earlier in
    /// this same transaction
    async fn get(&mut self, key: &str) -> Option<Value>;

    /// Buffers a create-or-replace of the record under ``key``
    fn put(&mut self, key: &str, value: Value);

    /// Buffers the removal of the record under ``key``
    fn remove(&mut self, key: &str);

    /// Atomically applies every buffered write
    async fn commit(self) -> Result<(), ChimeErrors>;

    /// Discards every buffered write
    async fn rollback(self);
}

/// [`ScheduleStore`] is the typed persistence layer for [`Schedule`]
/// entities on top of the raw [`StoreTransaction`] records. Every operation
/// participates in the ambient transaction supplied by the caller, nothing
/// here commits on its own
///
/// Alongside the entities themselves it maintains two registry records, the
/// set of active schedule ids and the set of cancelled ones, which are
/// mutated inside the same transaction as the entity they track. The active
/// set is what reconstructs the timing queue on startup
pub struct ScheduleStore;

impl ScheduleStore {
    fn key_of(id: &ScheduleId) -> String {
        format!("{SCHEDULE_KEY_PREFIX}{id}")
    }

    /// Persists a brand new schedule and registers it in the active set
    ///
    /// # Returns
    /// Fails with [`ChimeErrors::DuplicateSchedule`] when the identity is
    /// already taken
    pub async fn create<Tx: StoreTransaction>(
        tx: &mut Tx,
        schedule: &Schedule,
    ) -> Result<(), ChimeErrors> {
        let key = Self::key_of(schedule.id());
        if tx.get(&key).await.is_some() {
            return Err(ChimeErrors::DuplicateSchedule(*schedule.id()));
        }
        Self::save(tx, schedule)?;
        let mut active = Self::read_set(tx, ACTIVE_SET_KEY).await;
        active.push(*schedule.id());
        Self::write_set(tx, ACTIVE_SET_KEY, &active);
        Ok(())
    }

    /// Loads a schedule by identity, failing with
    /// [`ChimeErrors::ScheduleNotFound`] when absent
    pub async fn get<Tx: StoreTransaction>(
        tx: &mut Tx,
        id: &ScheduleId,
    ) -> Result<Schedule, ChimeErrors> {
        Self::try_get(tx, id)
            .await?
            .ok_or(ChimeErrors::ScheduleNotFound(*id))
    }

    /// Loads a schedule by identity, ``Ok(None)`` when absent. Races with
    /// concurrent removal are expected, callers that can tolerate absence
    /// use this instead of [`ScheduleStore::get`]
    pub async fn try_get<Tx: StoreTransaction>(
        tx: &mut Tx,
        id: &ScheduleId,
    ) -> Result<Option<Schedule>, ChimeErrors> {
        let key = Self::key_of(id);
        match tx.get(&key).await {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| ChimeErrors::Deserialization(key, err.to_string())),
        }
    }

    /// Buffers the current state of ``schedule`` into the transaction
    pub fn save<Tx: StoreTransaction>(tx: &mut Tx, schedule: &Schedule) -> Result<(), ChimeErrors> {
        let key = Self::key_of(schedule.id());
        let value = serde_json::to_value(schedule)
            .map_err(|err| ChimeErrors::Serialization(key.clone(), err.to_string()))?;
        tx.put(&key, value);
        Ok(())
    }

    /// Physically removes a schedule and drops it from both registry sets
    ///
    /// # Returns
    /// ``false`` when no schedule with that identity existed
    pub async fn remove<Tx: StoreTransaction>(tx: &mut Tx, id: &ScheduleId) -> bool {
        let key = Self::key_of(id);
        if tx.get(&key).await.is_none() {
            return false;
        }
        tx.remove(&key);
        let active: Vec<ScheduleId> = Self::read_set(tx, ACTIVE_SET_KEY)
            .await
            .into_iter()
            .filter(|member| member != id)
            .collect();
        Self::write_set(tx, ACTIVE_SET_KEY, &active);
        let cancelled: Vec<ScheduleId> = Self::read_set(tx, CANCELLED_SET_KEY)
            .await
            .into_iter()
            .filter(|member| member != id)
            .collect();
        Self::write_set(tx, CANCELLED_SET_KEY, &cancelled);
        true
    }

    /// Flags a schedule cancelled and moves its identity from the active
    /// registry set to the cancelled one. The entity stays in the store,
    /// logically inert
    pub async fn cancel<Tx: StoreTransaction>(
        tx: &mut Tx,
        id: &ScheduleId,
    ) -> Result<Schedule, ChimeErrors> {
        let mut schedule = Self::get(tx, id).await?;
        schedule.mark_cancelled();
        schedule.set_next_fire(None);
        Self::save(tx, &schedule)?;
        let active: Vec<ScheduleId> = Self::read_set(tx, ACTIVE_SET_KEY)
            .await
            .into_iter()
            .filter(|member| member != id)
            .collect();
        Self::write_set(tx, ACTIVE_SET_KEY, &active);
        let mut cancelled = Self::read_set(tx, CANCELLED_SET_KEY).await;
        if !cancelled.contains(id) {
            cancelled.push(*id);
        }
        Self::write_set(tx, CANCELLED_SET_KEY, &cancelled);
        Ok(schedule)
    }

    /// Invokes ``f`` with every active, loadable schedule. Identities in the
    /// registry whose entity is gone or unreadable are skipped with a log
    /// line, a half-removed record must not poison startup
    pub async fn for_each_active<Tx: StoreTransaction>(tx: &mut Tx, mut f: impl FnMut(Schedule)) {
        let active = Self::read_set(tx, ACTIVE_SET_KEY).await;
        for id in active {
            match Self::try_get(tx, &id).await {
                Ok(Some(schedule)) => f(schedule),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(%id, %err, "skipping unreadable schedule record");
                }
            }
        }
    }

    async fn read_set<Tx: StoreTransaction>(tx: &mut Tx, key: &str) -> Vec<ScheduleId> {
        match tx.get(key).await {
            None => Vec::new(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                tracing::error!(key, %err, "registry set record is unreadable, resetting it");
                Vec::new()
            }),
        }
    }

    fn write_set<Tx: StoreTransaction>(tx: &mut Tx, key: &str, members: &[ScheduleId]) {
        // serializing a Vec<Uuid> cannot fail
        tx.put(key, serde_json::json!(members));
    }
}
