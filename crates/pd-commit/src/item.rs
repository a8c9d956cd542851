use pd_types::EntityId;
use serde::{Deserialize, Serialize};

/// One issue in the local working set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditItem {
    /// Human-readable issue key, e.g. `ABC-123`.
    pub key: String,
    /// Numeric id, if already known. Recovered on commit otherwise.
    pub entity_id: Option<EntityId>,
    /// Value observed when the edit session started.
    pub baseline: f64,
    /// Value the user wants.
    pub local_edit: f64,
    pub dirty: bool,
}

impl EditItem {
    /// A clean item as fetched from the server.
    pub fn fetched(key: impl Into<String>, entity_id: Option<EntityId>, value: f64) -> Self {
        Self {
            key: key.into(),
            entity_id,
            baseline: value,
            local_edit: value,
            dirty: false,
        }
    }

    /// Record a local edit.
    pub fn edit(&mut self, value: f64) {
        self.local_edit = value;
        self.dirty = true;
    }

    pub fn needs_commit(&self) -> bool {
        self.dirty && self.local_edit != self.baseline
    }

    /// Adopt a committed value as the new baseline.
    pub(crate) fn settle(&mut self, value: f64) {
        self.baseline = value;
        self.local_edit = value;
        self.dirty = false;
    }
}
