//! Foundation types for Pointdown.
//!
//! Pointdown lets several uncoordinated clients edit the same numeric field
//! of a remote issue. This crate holds the vocabulary every other Pointdown
//! crate shares.
//!
//! # Key Types
//!
//! - [`EntityId`] -- Stable numeric id of a remote issue
//! - [`OwnerId`] -- Opaque per-session identity written into lock records
//! - [`Nonce`] -- Per-acquisition token distinguishing lock instances
//! - [`LockRecord`] -- The lock value stored in the entity property
//! - [`ObservedLock`] -- A lock value read back from the store, parsed leniently
//! - [`EditRecord`] -- Baseline/local/server triple for one commit attempt
//! - [`TaskHandle`] -- Reference to a deferred asynchronous write
//! - [`Clock`] -- Injectable wall clock

pub mod clock;
pub mod edit;
pub mod entity;
pub mod error;
pub mod lock;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use edit::EditRecord;
pub use entity::{EntityId, Nonce, OwnerId};
pub use error::TypeError;
pub use lock::{LockRecord, ObservedLock};
pub use task::TaskHandle;
