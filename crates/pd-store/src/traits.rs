use async_trait::async_trait;
use pd_types::{EntityId, TaskHandle};
use serde_json::Value;

use crate::error::StoreResult;
use crate::task::{TaskOutcome, TaskPolling};

/// Condition a write is applied under.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// The property must not exist.
    Absent,
    /// The property must currently hold exactly this value.
    EqualTo(Value),
}

impl Predicate {
    /// Evaluate against the property's current state.
    pub fn matches(&self, current: Option<&Value>) -> bool {
        match (self, current) {
            (Self::Absent, None) => true,
            (Self::EqualTo(expected), Some(current)) => expected == current,
            _ => false,
        }
    }
}

/// What the backend did with a conditional write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Applied synchronously.
    Committed,
    /// The predicate did not hold; nothing was written.
    PredicateFailed,
    /// Accepted for asynchronous execution; resolve with
    /// [`PropertyStore::poll_task`] before treating it as committed.
    Deferred(TaskHandle),
}

/// Conditional key/value storage attached to remote entities.
///
/// Implementations must apply each conditional write atomically from the
/// caller's perspective: the predicate check and the mutation cannot be
/// interleaved with another writer's.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Read a property. Returns `Ok(None)` if it does not exist.
    async fn read(&self, entity: EntityId, key: &str) -> StoreResult<Option<Value>>;

    /// Set a property if `predicate` holds.
    async fn conditional_set(
        &self,
        entity: EntityId,
        key: &str,
        predicate: &Predicate,
        value: &Value,
    ) -> StoreResult<WriteOutcome>;

    /// Delete a property if it currently equals `expected`.
    async fn conditional_delete(
        &self,
        entity: EntityId,
        key: &str,
        expected: &Value,
    ) -> StoreResult<WriteOutcome>;

    /// Poll a deferred task until it reaches a terminal state or
    /// `polling.max_attempts` is exhausted, in which case the result is
    /// [`TaskOutcome::Pending`].
    async fn poll_task(&self, handle: &TaskHandle, polling: TaskPolling)
        -> StoreResult<TaskOutcome>;

    /// Returns `true` only if the write is known to have been applied.
    ///
    /// Deferred outcomes are resolved through [`poll_task`]; a task that
    /// fails or is still pending counts as not committed.
    ///
    /// [`poll_task`]: PropertyStore::poll_task
    async fn confirm(&self, outcome: WriteOutcome, polling: TaskPolling) -> StoreResult<bool> {
        match outcome {
            WriteOutcome::Committed => Ok(true),
            WriteOutcome::PredicateFailed => Ok(false),
            WriteOutcome::Deferred(handle) => {
                let resolved = self.poll_task(&handle, polling).await?;
                tracing::debug!(task = %handle, outcome = ?resolved, "deferred write resolved");
                Ok(resolved.is_success())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_predicate() {
        assert!(Predicate::Absent.matches(None));
        assert!(!Predicate::Absent.matches(Some(&json!({}))));
    }

    #[test]
    fn equal_to_predicate_compares_whole_value() {
        let held = json!({"owner": "a", "nonce": "1", "expiresAt": "2026-01-01T00:00:00Z"});
        let p = Predicate::EqualTo(held.clone());
        assert!(p.matches(Some(&held)));
        assert!(!p.matches(None));
        let mut other = held.clone();
        other["nonce"] = json!("2");
        assert!(!p.matches(Some(&other)));
    }
}
