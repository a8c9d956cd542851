//! Entity property storage for Pointdown.
//!
//! The issue tracker lets clients attach arbitrary JSON "properties" to an
//! entity, but the only safe way to mutate them concurrently is through
//! conditional writes: set-if-absent, set-if-equal, delete-if-equal. This
//! crate abstracts that API behind the [`PropertyStore`] trait.
//!
//! # Storage Backends
//!
//! - [`InMemoryPropertyStore`] -- exact CAS semantics for tests and simulation
//! - `pd_http::HttpBackend` -- the tracker's REST API
//!
//! # Design Rules
//!
//! 1. Properties are never mutated unconditionally.
//! 2. A [`WriteOutcome::Deferred`] write is not committed until its task
//!    resolves to [`TaskOutcome::Success`]; see [`PropertyStore::confirm`].
//! 3. Errors are not retried here. Callers own the retry policy.

pub mod error;
pub mod memory;
pub mod task;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{DeferMode, InMemoryPropertyStore};
pub use task::{classify_status, status_text, TaskOutcome, TaskPolling};
pub use traits::{Predicate, PropertyStore, WriteOutcome};
