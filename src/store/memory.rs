use crate::errors::ChimeErrors;
use crate::store::{DurableStore, StoreTransaction};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct VersionedRecord {
    version: u64,
    value: Value,
}

/// [`MemoryStore`] is an in-memory implementation of [`DurableStore`] with
/// optimistic concurrency: every record carries a version, a transaction
/// remembers the version of everything it read, and commit fails with
/// [`ChimeErrors::TransientConflict`] when any of those records changed in
/// the meantime
///
/// # Usage Note(s)
/// Being purely in-memory it doesn't survive process restarts, it is meant
/// for tests, demos and as the reference semantics for backends that do
/// persist. Cloning it is cheap and yields a handle onto the same record
/// table, which is how tests inspect state the scheduler committed
///
/// # See Also
/// - [`DurableStore`]
/// - [`StoreTransaction`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, VersionedRecord>>,
    commit_gate: Arc<Mutex<()>>,
}

impl MemoryStore {
    /// Creates / Constructs a new empty [`MemoryStore`] instance
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self, usecase: &str) -> MemoryTransaction {
        MemoryTransaction {
            usecase: usecase.to_owned(),
            records: self.records.clone(),
            commit_gate: self.commit_gate.clone(),
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }
}

/// A single unit of work over a [`MemoryStore`]. Reads record the version
/// they observed (``None`` for absent records), writes are buffered until
/// commit; commit validates the whole read set under the store's commit
/// gate before applying anything, so a batch either lands fully or not at all
pub struct MemoryTransaction {
    usecase: String,
    records: Arc<DashMap<String, VersionedRecord>>,
    commit_gate: Arc<Mutex<()>>,
    reads: HashMap<String, Option<u64>>,
    writes: HashMap<String, Option<Value>>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, key: &str) -> Option<Value> {
        if let Some(buffered) = self.writes.get(key) {
            return buffered.clone();
        }
        let observed = self.records.get(key);
        let version = observed.as_ref().map(|record| record.version);
        self.reads.entry(key.to_owned()).or_insert(version);
        observed.map(|record| record.value.clone())
    }

    fn put(&mut self, key: &str, value: Value) {
        self.writes.insert(key.to_owned(), Some(value));
    }

    fn remove(&mut self, key: &str) {
        self.writes.insert(key.to_owned(), None);
    }

    async fn commit(self) -> Result<(), ChimeErrors> {
        let _gate = self.commit_gate.lock().await;
        for (key, observed) in &self.reads {
            let current = self.records.get(key).map(|record| record.version);
            if current != *observed {
                tracing::debug!(usecase = %self.usecase, key, "commit lost the race, conflict");
                return Err(ChimeErrors::TransientConflict(key.clone()));
            }
        }
        for (key, write) in self.writes {
            match write {
                Some(value) => {
                    let version = self
                        .records
                        .get(&key)
                        .map(|record| record.version + 1)
                        .unwrap_or(1);
                    self.records.insert(key, VersionedRecord { version, value });
                }
                None => {
                    self.records.remove(&key);
                }
            }
        }
        tracing::trace!(usecase = %self.usecase, "transaction committed");
        Ok(())
    }

    async fn rollback(self) {
        tracing::trace!(usecase = %self.usecase, "transaction rolled back");
    }
}
