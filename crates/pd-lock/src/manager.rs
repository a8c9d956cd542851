use std::sync::Arc;
use std::time::Duration;

use pd_store::{Predicate, PropertyStore};
use pd_types::{Clock, EntityId, LockRecord, ObservedLock, OwnerId};
use rand::Rng;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::LockConfig;
use crate::error::{LockError, LockResult, LogOnly};

/// State of a lock found by [`LockManager::clear_expired`].
#[derive(Clone, Debug, PartialEq)]
pub enum StaleLock {
    /// No lock property exists.
    Absent,
    /// A live lock is held; it was left alone.
    Held(ObservedLock),
    /// An expired lock was deleted.
    Cleared(ObservedLock),
}

/// Acquires and releases the cooperative lock for one lock key.
///
/// One manager represents one owner. Several managers (in this process or
/// on other machines) contend for the same entity through the shared
/// [`PropertyStore`]. A manager must not wait for the same entity from two
/// tasks at once: a record carrying its own owner is taken to be left over
/// from a claim whose verifying read failed, and is replaced.
pub struct LockManager {
    store: Arc<dyn PropertyStore>,
    clock: Arc<dyn Clock>,
    owner: OwnerId,
    config: LockConfig,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn PropertyStore>,
        clock: Arc<dyn Clock>,
        owner: OwnerId,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            clock,
            owner,
            config,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Acquire the lock using the configured TTL, budget and poll interval.
    pub async fn acquire_or_wait(&self, entity: Option<EntityId>) -> LockResult<LockRecord> {
        self.acquire_or_wait_with(
            entity,
            self.config.ttl,
            self.config.total_timeout,
            self.config.poll_interval,
        )
        .await
    }

    /// Acquire the lock on `entity`, waiting up to `total_timeout`.
    ///
    /// Each round first tries to create the lock, then, if an expired lock
    /// is in the way, to replace exactly the record it observed. A claim
    /// only counts once a re-read shows our nonce. Contested rounds sleep
    /// `poll_interval` plus jitter. Store errors are treated as a lost
    /// round; only the budget running out ends the wait.
    pub async fn acquire_or_wait_with(
        &self,
        entity: Option<EntityId>,
        ttl: Duration,
        total_timeout: Duration,
        poll_interval: Duration,
    ) -> LockResult<LockRecord> {
        let entity = entity.ok_or_else(|| {
            LockError::InvalidArgument("a numeric entity id is required to lock".into())
        })?;

        let started = Instant::now();
        let mut attempt: u32 = 0;
        let mut retried_immediately = false;
        let mut last_error: Option<String> = None;

        while started.elapsed() < total_timeout {
            attempt += 1;
            let candidate = LockRecord::candidate(self.owner.clone(), self.clock.now(), ttl);
            let value = candidate.to_value()?;

            let mut claim_errored = false;
            match self.claim(entity, &Predicate::Absent, &candidate, &value).await {
                Ok(true) => {
                    tracing::info!(%entity, owner = %self.owner, nonce = %candidate.nonce, attempt, "lock acquired");
                    return Ok(candidate);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(%entity, attempt, error = %e, "lock create attempt failed");
                    last_error = Some(e.to_string());
                    claim_errored = true;
                }
            }

            match self.store.read(entity, &self.config.key).await {
                Ok(None) if !claim_errored && !retried_immediately => {
                    // Released between our attempt and the read.
                    retried_immediately = true;
                    continue;
                }
                Ok(None) => {}
                Ok(Some(raw)) => {
                    let existing = ObservedLock::new(raw);
                    // Our own record left behind by a claim whose verifying read failed.
                    let orphaned = existing.owner() == Some(self.owner.as_str());
                    if orphaned || existing.is_expired_at(self.clock.now()) {
                        tracing::debug!(%entity, holder = ?existing.owner(), orphaned, "attempting takeover");
                        let takeover = Predicate::EqualTo(existing.raw().clone());
                        match self.claim(entity, &takeover, &candidate, &value).await {
                            Ok(true) => {
                                tracing::info!(
                                    %entity,
                                    owner = %self.owner,
                                    previous = ?existing.owner(),
                                    attempt,
                                    "expired lock taken over"
                                );
                                return Ok(candidate);
                            }
                            Ok(false) => {
                                tracing::debug!(%entity, attempt, "takeover lost the race");
                            }
                            Err(e) => {
                                tracing::debug!(%entity, attempt, error = %e, "takeover attempt failed");
                                last_error = Some(e.to_string());
                            }
                        }
                    } else {
                        tracing::debug!(
                            %entity,
                            holder = ?existing.owner(),
                            expires_at = ?existing.expires_at(),
                            attempt,
                            "lock held, waiting"
                        );
                    }
                }
                Err(e) => {
                    tracing::debug!(%entity, attempt, error = %e, "failed to read lock");
                    last_error = Some(e.to_string());
                }
            }

            retried_immediately = false;
            let remaining = total_timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(self.backoff(poll_interval).min(remaining)).await;
        }

        tracing::warn!(%entity, waited = ?total_timeout, attempts = attempt, "gave up waiting for lock");
        Err(LockError::Timeout {
            entity,
            waited: total_timeout,
            last_error,
        })
    }

    /// Best-effort release of a lock this manager acquired.
    ///
    /// Deletes the property only if it still holds exactly `held`. Nothing
    /// that goes wrong here is an error for the caller: the lock expires on
    /// its own. Failures come back as [`LogOnly`] after being logged.
    pub async fn release(&self, entity: EntityId, held: &LockRecord) -> Result<(), LogOnly> {
        let result = self.try_release(entity, held).await;
        match &result {
            Ok(()) => tracing::debug!(%entity, nonce = %held.nonce, "lock released"),
            Err(reason) => tracing::warn!(%entity, nonce = %held.nonce, %reason, "lock release skipped"),
        }
        result
    }

    async fn try_release(&self, entity: EntityId, held: &LockRecord) -> Result<(), LogOnly> {
        let expected = held
            .to_value()
            .map_err(|e| LogOnly::new(format!("cannot encode held lock: {e}")))?;
        let outcome = self
            .store
            .conditional_delete(entity, &self.config.key, &expected)
            .await
            .map_err(|e| LogOnly::new(format!("delete failed: {e}")))?;
        let confirmed = self
            .store
            .confirm(outcome, self.config.task_polling)
            .await
            .map_err(|e| LogOnly::new(format!("delete not confirmed: {e}")))?;
        if confirmed {
            Ok(())
        } else {
            Err(LogOnly::new("lock no longer held by this owner"))
        }
    }

    /// Read the current lock on `entity`, if any.
    pub async fn inspect(&self, entity: EntityId) -> LockResult<Option<ObservedLock>> {
        let raw = self.store.read(entity, &self.config.key).await?;
        Ok(raw.map(ObservedLock::new))
    }

    /// Delete the lock on `entity` if, and only if, it has expired.
    ///
    /// The delete is conditional on the observed record, so a lock renewed
    /// in the meantime survives.
    pub async fn clear_expired(&self, entity: EntityId) -> LockResult<StaleLock> {
        let Some(existing) = self.inspect(entity).await? else {
            return Ok(StaleLock::Absent);
        };
        if !existing.is_expired_at(self.clock.now()) {
            return Ok(StaleLock::Held(existing));
        }
        let outcome = self
            .store
            .conditional_delete(entity, &self.config.key, existing.raw())
            .await?;
        if self.store.confirm(outcome, self.config.task_polling).await? {
            tracing::info!(%entity, holder = ?existing.owner(), "expired lock cleared");
            Ok(StaleLock::Cleared(existing))
        } else {
            // Someone replaced it between our read and the delete.
            let current = self.inspect(entity).await?;
            Ok(current.map_or(StaleLock::Absent, StaleLock::Held))
        }
    }

    /// Write `value` under `predicate`, then confirm by re-reading that the
    /// stored nonce is ours.
    async fn claim(
        &self,
        entity: EntityId,
        predicate: &Predicate,
        candidate: &LockRecord,
        value: &Value,
    ) -> LockResult<bool> {
        let outcome = self
            .store
            .conditional_set(entity, &self.config.key, predicate, value)
            .await?;
        if !self.store.confirm(outcome, self.config.task_polling).await? {
            return Ok(false);
        }
        let current = self.store.read(entity, &self.config.key).await?;
        Ok(current
            .map(ObservedLock::new)
            .is_some_and(|observed| observed.is_instance(candidate)))
    }

    fn backoff(&self, poll_interval: Duration) -> Duration {
        let max_jitter = self.config.max_jitter.as_millis() as u64;
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        poll_interval + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pd_store::{InMemoryPropertyStore, TaskPolling};
    use pd_types::{ManualClock, SystemClock};
    use serde_json::json;

    const KEY: &str = "point_down_lock";

    fn entity() -> EntityId {
        EntityId::new(10_001).unwrap()
    }

    fn fast_config() -> LockConfig {
        LockConfig {
            ttl: Duration::from_secs(60),
            total_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            max_jitter: Duration::from_millis(5),
            task_polling: TaskPolling {
                interval: Duration::from_millis(1),
                max_attempts: 5,
            },
            ..LockConfig::default()
        }
    }

    fn manager(
        store: &Arc<InMemoryPropertyStore>,
        clock: Arc<dyn Clock>,
        owner: &str,
    ) -> LockManager {
        LockManager::new(
            store.clone(),
            clock,
            OwnerId::from_string(owner),
            fast_config(),
        )
    }

    #[tokio::test]
    async fn acquires_free_lock_and_writes_record() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let alice = manager(&store, Arc::new(SystemClock), "alice");

        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();
        assert_eq!(held.owner.as_str(), "alice");
        assert_eq!(store.get(entity(), KEY), Some(held.to_value().unwrap()));
    }

    #[tokio::test]
    async fn missing_entity_id_is_invalid_argument() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let alice = manager(&store, Arc::new(SystemClock), "alice");
        let err = alice.acquire_or_wait(None).await.unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn zero_budget_on_held_lock_fails_immediately() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let alice = manager(&store, clock.clone(), "alice");
        let bob = manager(&store, clock, "bob");
        alice.acquire_or_wait(Some(entity())).await.unwrap();

        let started = std::time::Instant::now();
        let err = bob
            .acquire_or_wait_with(
                Some(entity()),
                Duration::from_secs(60),
                Duration::ZERO,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unexpired_lock_blocks_until_timeout() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let alice = manager(&store, clock.clone(), "alice");
        let bob = manager(&store, clock, "bob");

        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();
        let err = bob.acquire_or_wait(Some(entity())).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { entity: e, .. } if e == entity()));
        assert_eq!(store.get(entity(), KEY), Some(held.to_value().unwrap()));
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over_without_release() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let alice = manager(&store, clock.clone(), "alice");
        let bob = manager(&store, clock.clone(), "bob");

        let alices = alice.acquire_or_wait(Some(entity())).await.unwrap();
        clock.advance(Duration::from_secs(61));

        let bobs = bob.acquire_or_wait(Some(entity())).await.unwrap();
        assert_eq!(bobs.owner.as_str(), "bob");
        assert_ne!(bobs.nonce, alices.nonce);
        assert_eq!(store.get(entity(), KEY), Some(bobs.to_value().unwrap()));
    }

    #[tokio::test]
    async fn lock_is_not_takeable_before_ttl_elapses() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let alice = manager(&store, clock.clone(), "alice");
        let bob = manager(&store, clock.clone(), "bob");

        alice.acquire_or_wait(Some(entity())).await.unwrap();
        clock.advance(Duration::from_secs(59));
        assert!(bob.acquire_or_wait(Some(entity())).await.is_err());
    }

    #[tokio::test]
    async fn garbage_lock_record_counts_as_expired() {
        let store = Arc::new(InMemoryPropertyStore::new());
        store.put(entity(), KEY, json!({"owner": "ghost", "expiresAt": "not a time"}));
        let bob = manager(&store, Arc::new(SystemClock), "bob");

        let held = bob.acquire_or_wait(Some(entity())).await.unwrap();
        assert_eq!(store.get(entity(), KEY), Some(held.to_value().unwrap()));
    }

    #[tokio::test]
    async fn own_record_from_unverified_claim_is_reclaimed() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let alice = manager(&store, Arc::new(SystemClock), "alice");
        // The first create commits, then its verifying read and the
        // follow-up read both fail, leaving an unexpired record behind.
        store.fail_next_reads(entity(), 2);

        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();
        assert_eq!(held.owner, *alice.owner());
        assert_eq!(store.get(entity(), KEY), Some(held.to_value().unwrap()));
    }

    #[tokio::test]
    async fn release_frees_the_lock() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let alice = manager(&store, clock.clone(), "alice");
        let bob = manager(&store, clock, "bob");

        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();
        assert_eq!(alice.release(entity(), &held).await, Ok(()));
        assert!(store.get(entity(), KEY).is_none());
        assert!(bob.acquire_or_wait(Some(entity())).await.is_ok());
    }

    #[tokio::test]
    async fn double_release_is_harmless() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let alice = manager(&store, Arc::new(SystemClock), "alice");

        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();
        assert!(alice.release(entity(), &held).await.is_ok());
        assert!(alice.release(entity(), &held).await.is_err());
    }

    #[tokio::test]
    async fn release_after_takeover_leaves_new_holder_alone() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let alice = manager(&store, clock.clone(), "alice");
        let bob = manager(&store, clock.clone(), "bob");

        let alices = alice.acquire_or_wait(Some(entity())).await.unwrap();
        clock.advance(Duration::from_secs(120));
        let bobs = bob.acquire_or_wait(Some(entity())).await.unwrap();

        let late = alice.release(entity(), &alices).await;
        assert!(late.is_err());
        assert_eq!(store.get(entity(), KEY), Some(bobs.to_value().unwrap()));
    }

    #[tokio::test]
    async fn release_swallows_store_failures() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let alice = manager(&store, Arc::new(SystemClock), "alice");
        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();

        store.inject_fault(entity());
        let result = alice.release(entity(), &held).await;
        assert!(result.unwrap_err().reason.contains("delete failed"));
    }

    #[tokio::test]
    async fn store_errors_end_in_timeout_not_store_error() {
        let store = Arc::new(InMemoryPropertyStore::new());
        store.inject_fault(entity());
        let alice = manager(&store, Arc::new(SystemClock), "alice");

        let err = alice.acquire_or_wait(Some(entity())).await.unwrap_err();
        match err {
            LockError::Timeout { last_error, .. } => {
                assert!(last_error.unwrap().contains("500"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deferred_writes_are_confirmed_before_claiming() {
        let store = Arc::new(InMemoryPropertyStore::deferred(2));
        let alice = manager(&store, Arc::new(SystemClock), "alice");

        let held = alice.acquire_or_wait(Some(entity())).await.unwrap();
        assert_eq!(store.get(entity(), KEY), Some(held.to_value().unwrap()));
        assert!(alice.release(entity(), &held).await.is_ok());
        assert!(store.get(entity(), KEY).is_none());
    }

    #[tokio::test]
    async fn pending_tasks_never_count_as_acquired() {
        let store = Arc::new(InMemoryPropertyStore::deferred(u32::MAX));
        let alice = manager(&store, Arc::new(SystemClock), "alice");

        let err = alice.acquire_or_wait(Some(entity())).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn clear_expired_respects_live_locks() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let alice = manager(&store, clock.clone(), "alice");
        let admin = manager(&store, clock.clone(), "admin");

        assert_eq!(admin.clear_expired(entity()).await.unwrap(), StaleLock::Absent);

        alice.acquire_or_wait(Some(entity())).await.unwrap();
        assert!(matches!(admin.clear_expired(entity()).await.unwrap(), StaleLock::Held(_)));

        clock.advance(Duration::from_secs(61));
        assert!(matches!(admin.clear_expired(entity()).await.unwrap(), StaleLock::Cleared(_)));
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquirers_are_mutually_exclusive() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let config = LockConfig {
                total_timeout: Duration::from_secs(20),
                poll_interval: Duration::from_millis(2),
                max_jitter: Duration::from_millis(3),
                ..fast_config()
            };
            let manager = LockManager::new(
                store.clone(),
                Arc::new(SystemClock),
                OwnerId::from_string(format!("worker-{i}")),
                config,
            );
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let held = manager.acquire_or_wait(Some(entity())).await.unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    manager.release(entity(), &held).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }
}
