//! In-memory property store for tests and simulation.
//!
//! [`InMemoryPropertyStore`] keeps every property in a `HashMap` behind a
//! `Mutex`, and evaluates each conditional write under that mutex, which
//! gives it exact compare-and-swap semantics. It can also mimic the two
//! awkward behaviours of the real backend: deferring writes to asynchronous
//! tasks, and failing outright for a given entity.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pd_types::{EntityId, TaskHandle};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::task::{TaskOutcome, TaskPolling};
use crate::traits::{Predicate, PropertyStore, WriteOutcome};

/// How writes are acknowledged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeferMode {
    /// Every write returns `Committed` or `PredicateFailed` directly.
    #[default]
    Immediate,
    /// Every write returns `Deferred`. The mutation is applied at once, but
    /// its task only reports a terminal state after `polls_until_done` polls.
    Deferred { polls_until_done: u32 },
}

#[derive(Debug)]
struct PendingTask {
    polls_remaining: u32,
    outcome: TaskOutcome,
}

#[derive(Debug, Default)]
struct Inner {
    properties: HashMap<(EntityId, String), Value>,
    tasks: HashMap<String, PendingTask>,
    next_task: u64,
    faulted: HashSet<EntityId>,
    /// Reads left to fail per entity, independent of `faulted`.
    failing_reads: HashMap<EntityId, u32>,
    mode: DeferMode,
}

/// An in-memory implementation of [`PropertyStore`].
#[derive(Debug, Default)]
pub struct InMemoryPropertyStore {
    inner: Mutex<Inner>,
}

impl InMemoryPropertyStore {
    /// Create a new empty store that acknowledges writes immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that defers every write.
    pub fn deferred(polls_until_done: u32) -> Self {
        let store = Self::new();
        store.set_mode(DeferMode::Deferred { polls_until_done });
        store
    }

    pub fn set_mode(&self, mode: DeferMode) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.mode = mode;
        }
    }

    /// Make every operation touching `entity` fail with a 500 status.
    pub fn inject_fault(&self, entity: EntityId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faulted.insert(entity);
        }
    }

    /// Make the next `count` reads of `entity` fail with a 503 status while
    /// writes keep working.
    pub fn fail_next_reads(&self, entity: EntityId, count: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_reads.insert(entity, count);
        }
    }

    pub fn clear_fault(&self, entity: EntityId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faulted.remove(&entity);
        }
    }

    /// Current value of a property, bypassing fault injection.
    pub fn get(&self, entity: EntityId, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .ok()?
            .properties
            .get(&(entity, key.to_string()))
            .cloned()
    }

    /// Unconditionally seed a property.
    pub fn put(&self, entity: EntityId, key: &str, value: Value) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.properties.insert((entity, key.to_string()), value);
        }
    }

    /// Number of stored properties.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.properties.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_inner(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn lock_for(&self, entity: EntityId) -> StoreResult<MutexGuard<'_, Inner>> {
        let inner = self.lock_inner()?;
        if inner.faulted.contains(&entity) {
            return Err(StoreError::status(500, format!("injected fault for entity {entity}")));
        }
        Ok(inner)
    }
}

impl Inner {
    /// Wrap the result of an already-applied mutation according to the mode.
    fn acknowledge(&mut self, applied: bool) -> WriteOutcome {
        match self.mode {
            DeferMode::Immediate if applied => WriteOutcome::Committed,
            DeferMode::Immediate => WriteOutcome::PredicateFailed,
            DeferMode::Deferred { polls_until_done } => {
                self.next_task += 1;
                let location = format!("memory://task/{}", self.next_task);
                let outcome = if applied {
                    TaskOutcome::Success
                } else {
                    TaskOutcome::Failure
                };
                self.tasks.insert(
                    location.clone(),
                    PendingTask {
                        polls_remaining: polls_until_done,
                        outcome,
                    },
                );
                WriteOutcome::Deferred(TaskHandle::new(location))
            }
        }
    }
}

#[async_trait]
impl PropertyStore for InMemoryPropertyStore {
    async fn read(&self, entity: EntityId, key: &str) -> StoreResult<Option<Value>> {
        let mut inner = self.lock_for(entity)?;
        if let Some(left) = inner.failing_reads.get_mut(&entity).filter(|left| **left > 0) {
            *left -= 1;
            return Err(StoreError::status(503, format!("injected read fault for entity {entity}")));
        }
        Ok(inner.properties.get(&(entity, key.to_string())).cloned())
    }

    async fn conditional_set(
        &self,
        entity: EntityId,
        key: &str,
        predicate: &Predicate,
        value: &Value,
    ) -> StoreResult<WriteOutcome> {
        let mut inner = self.lock_for(entity)?;
        let slot = (entity, key.to_string());
        let applied = predicate.matches(inner.properties.get(&slot));
        if applied {
            inner.properties.insert(slot, value.clone());
        }
        Ok(inner.acknowledge(applied))
    }

    async fn conditional_delete(
        &self,
        entity: EntityId,
        key: &str,
        expected: &Value,
    ) -> StoreResult<WriteOutcome> {
        let mut inner = self.lock_for(entity)?;
        let slot = (entity, key.to_string());
        let applied = inner.properties.get(&slot) == Some(expected);
        if applied {
            inner.properties.remove(&slot);
        }
        Ok(inner.acknowledge(applied))
    }

    async fn poll_task(
        &self,
        handle: &TaskHandle,
        polling: TaskPolling,
    ) -> StoreResult<TaskOutcome> {
        for _ in 0..polling.max_attempts {
            tokio::time::sleep(polling.interval).await;
            let mut inner = self.lock_inner()?;
            let task = inner
                .tasks
                .get_mut(handle.as_str())
                .ok_or_else(|| StoreError::TaskNotFound(handle.to_string()))?;
            task.polls_remaining = task.polls_remaining.saturating_sub(1);
            if task.polls_remaining == 0 {
                let outcome = task.outcome;
                inner.tasks.remove(handle.as_str());
                return Ok(outcome);
            }
        }
        Ok(TaskOutcome::Pending)
    }
}
