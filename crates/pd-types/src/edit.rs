use serde::{Deserialize, Serialize};

/// The three observations of the edited field for one commit attempt.
///
/// Built fresh immediately before committing and dropped afterwards.
/// `baseline` is the value seen when the edit session started,
/// `local_edit` is what the user wants, and `server_value` is re-read from
/// the tracker right before the write.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub baseline: f64,
    pub local_edit: f64,
    pub server_value: f64,
}

impl EditRecord {
    pub fn new(baseline: f64, local_edit: f64, server_value: f64) -> Self {
        Self {
            baseline,
            local_edit,
            server_value,
        }
    }

    /// Returns `true` if someone changed the field since the session began.
    pub fn has_drifted(&self) -> bool {
        self.server_value != self.baseline
    }

    /// The user's edit expressed as a delta, positive when they lowered it.
    pub fn adjustment(&self) -> f64 {
        self.baseline - self.local_edit
    }
}
