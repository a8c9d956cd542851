//! Edit committer for Pointdown.
//!
//! Takes a batch of locally edited field values and commits each one
//! against the remote tracker: read the current value, take the cooperative
//! lock, reconcile, write, release. Items are independent; a contested or
//! failing item is reported and skipped while the rest of the batch goes
//! through.

pub mod committer;
pub mod error;
pub mod field;
pub mod item;
pub mod memory;

pub use committer::{BatchReport, CommittedEdit, EditCommitter, FailedEdit};
pub use error::{CommitError, CommitResult, FieldError, FieldResult};
pub use field::{FieldService, FieldSnapshot};
pub use item::EditItem;
pub use memory::InMemoryFieldService;
