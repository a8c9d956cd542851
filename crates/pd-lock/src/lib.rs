//! Cooperative distributed lock for Pointdown.
//!
//! The lock is a single entity property holding a [`LockRecord`]. There is
//! no lock server: whoever manages to create the property with a
//! set-if-absent write holds the lock until it releases it or its
//! `expiresAt` passes, after which anyone may replace it with a
//! set-if-equal write against the exact value they observed.
//!
//! Guarantees are deliberately weak. Mutual exclusion holds as long as the
//! backend is read-your-writes consistent right after a successful
//! conditional write, and TTL expiry bounds how long a crashed holder can
//! block everyone else.
//!
//! [`LockRecord`]: pd_types::LockRecord

pub mod config;
pub mod error;
pub mod manager;

pub use config::LockConfig;
pub use error::{LockError, LockResult, LogOnly};
pub use manager::{LockManager, StaleLock};
