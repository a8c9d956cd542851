use std::fmt;
use std::time::Duration;

use pd_types::EntityId;
use thiserror::Error;

/// Errors from lock acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    /// The request cannot address a lock (e.g. no entity id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No lock was obtained within the wait budget.
    #[error("timed out after {waited:?} waiting for lock on entity {entity}{}", last_error_suffix(.last_error))]
    Timeout {
        entity: EntityId,
        waited: Duration,
        last_error: Option<String>,
    },

    #[error("store error: {0}")]
    Store(#[from] pd_store::StoreError),

    #[error("type error: {0}")]
    Type(#[from] pd_types::TypeError),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

pub type LockResult<T> = Result<T, LockError>;

/// A release that did not go through.
///
/// Releasing is an optimization: an unreleased lock simply expires. This
/// value is only ever logged, and deliberately has no conversion into
/// [`LockError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogOnly {
    pub reason: String,
}

impl LogOnly {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LogOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}
