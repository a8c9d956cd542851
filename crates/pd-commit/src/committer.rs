use std::fmt::Write as _;
use std::sync::Arc;

use pd_lock::LockManager;
use pd_merge::{MergeKind, Reconciliation};
use pd_types::EditRecord;

use crate::error::{CommitError, CommitResult};
use crate::field::FieldService;
use crate::item::EditItem;

/// An item that made it to the server.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedEdit {
    pub key: String,
    /// Value written.
    pub value: f64,
    /// Server value the edit was reconciled against.
    pub server_value: f64,
    pub kind: MergeKind,
}

/// An item that was left uncommitted; it stays dirty for a later retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedEdit {
    pub key: String,
    pub error: String,
}

/// Outcome of [`EditCommitter::commit_batch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub committed: Vec<CommittedEdit>,
    pub failed: Vec<FailedEdit>,
    /// Items that had nothing to commit.
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// The one human-readable line summarizing the batch.
    pub fn status_line(&self) -> String {
        if self.committed.is_empty() && self.failed.is_empty() {
            return "Nothing to save.".into();
        }
        if self.committed.is_empty() {
            let mut line = format!("Save failed for {} issue(s)", self.failed.len());
            self.append_failures(&mut line);
            return line;
        }
        let mut line = format!("{} issue(s) updated", self.committed.len());
        if self.failed.is_empty() {
            line.push('.');
        } else {
            let _ = write!(line, ", {} failed", self.failed.len());
            self.append_failures(&mut line);
        }
        line
    }

    fn append_failures(&self, line: &mut String) {
        line.push_str(": ");
        let details: Vec<String> = self
            .failed
            .iter()
            .map(|f| format!("{} ({})", f.key, f.error))
            .collect();
        line.push_str(&details.join("; "));
    }
}

/// Commits locally edited field values, one issue at a time.
pub struct EditCommitter {
    fields: Arc<dyn FieldService>,
    locks: Option<LockManager>,
}

impl EditCommitter {
    /// Commit without the cooperative lock; concurrent edits are still
    /// reconciled, but two writers may interleave.
    pub fn unlocked(fields: Arc<dyn FieldService>) -> Self {
        Self {
            fields,
            locks: None,
        }
    }

    /// Commit each item under the cooperative lock.
    pub fn locked(fields: Arc<dyn FieldService>, locks: LockManager) -> Self {
        Self {
            fields,
            locks: Some(locks),
        }
    }

    /// Commit every item that needs it, sequentially.
    ///
    /// Failures are isolated: a failed item is logged, reported and left
    /// dirty, and the batch moves on. Committed items adopt the written value
    /// as their new baseline.
    pub async fn commit_batch(&self, items: &mut [EditItem]) -> BatchReport {
        let mut report = BatchReport::default();
        for item in items.iter_mut() {
            if !item.needs_commit() {
                report.skipped += 1;
                continue;
            }
            match self.commit_one(item).await {
                Ok(edit) => {
                    tracing::info!(
                        key = %edit.key,
                        value = edit.value,
                        server_value = edit.server_value,
                        kind = ?edit.kind,
                        "edit committed"
                    );
                    report.committed.push(edit);
                }
                Err(e) => {
                    tracing::warn!(key = %item.key, error = %e, "edit not committed");
                    report.failed.push(FailedEdit {
                        key: item.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Commit a single item regardless of its dirty flag.
    pub async fn commit_one(&self, item: &mut EditItem) -> CommitResult<CommittedEdit> {
        let snapshot = self.fields.read_field(&item.key).await?;
        if item.entity_id.is_none() {
            item.entity_id = snapshot.entity_id;
        }

        let Some(locks) = &self.locks else {
            let edit = EditRecord::new(item.baseline, item.local_edit, snapshot.value);
            let committed = self.write_reconciled(&item.key, &edit).await?;
            item.settle(committed.value);
            return Ok(committed);
        };

        let Some(entity) = item.entity_id else {
            return Err(CommitError::MissingEntityId(item.key.clone()));
        };
        let held = locks.acquire_or_wait(Some(entity)).await?;

        // The value may have moved while we waited for the lock.
        let result = match self.fields.read_field(&item.key).await {
            Ok(fresh) => {
                let edit = EditRecord::new(item.baseline, item.local_edit, fresh.value);
                self.write_reconciled(&item.key, &edit).await
            }
            Err(e) => Err(e.into()),
        };
        let _ = locks.release(entity, &held).await;

        let committed = result?;
        item.settle(committed.value);
        Ok(committed)
    }

    async fn write_reconciled(&self, key: &str, edit: &EditRecord) -> CommitResult<CommittedEdit> {
        let merged = Reconciliation::of(edit);
        if merged.was_rebased() {
            tracing::debug!(
                %key,
                baseline = edit.baseline,
                server_value = edit.server_value,
                local_edit = edit.local_edit,
                "field moved since edit began, replaying as adjustment"
            );
        }
        self.fields.write_field(key, merged.value).await?;
        Ok(CommittedEdit {
            key: key.to_string(),
            value: merged.value,
            server_value: edit.server_value,
            kind: merged.kind,
        })
    }
}
