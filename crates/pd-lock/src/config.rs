use std::time::Duration;

use pd_store::TaskPolling;

/// Property key the lock lives under.
pub const DEFAULT_LOCK_KEY: &str = "point_down_lock";

/// Tuning for [`LockManager`](crate::LockManager).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// Entity property holding the lock record.
    pub key: String,
    /// Lifetime of an acquired lock. Must comfortably exceed the critical
    /// section it protects.
    pub ttl: Duration,
    /// Wall-clock budget for `acquire_or_wait`.
    pub total_timeout: Duration,
    /// Base delay between contested attempts.
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to `poll_interval`.
    pub max_jitter: Duration,
    /// Budget for resolving deferred writes.
    pub task_polling: TaskPolling,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_LOCK_KEY.into(),
            ttl: Duration::from_secs(60),
            total_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(900),
            max_jitter: Duration::from_millis(400),
            task_polling: TaskPolling::default(),
        }
    }
}
