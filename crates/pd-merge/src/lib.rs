//! Merge engine for Pointdown.
//!
//! Reconciles a local edit with the value currently on the server. When the
//! field has not moved since the edit session began, the local edit is
//! applied as an absolute value. When it has moved, the edit is replayed as
//! a relative adjustment on top of the fresh value, so a concurrent change
//! is never silently overwritten.
//!
//! All results are snapped to half steps and floored at zero.

use pd_types::EditRecord;
use serde::{Deserialize, Serialize};

/// Reconcile `local_edit` against a freshly read `server_value`.
///
/// ```
/// use pd_merge::reconcile;
///
/// assert_eq!(reconcile(5.0, 3.0, 5.0), 3.0); // nobody else touched it
/// assert_eq!(reconcile(5.0, 3.0, 8.0), 6.0); // -2 replayed on top of 8
/// ```
pub fn reconcile(baseline: f64, local_edit: f64, server_value: f64) -> f64 {
    if server_value == baseline {
        clamp_half_non_negative(local_edit)
    } else {
        let adjustment = baseline - local_edit;
        clamp_half_non_negative(server_value - adjustment)
    }
}

/// Round to the nearest multiple of 0.5, then floor at zero.
///
/// Ties round away from zero (`1.25 → 1.5`, `-0.25 → 0.0`). Non-finite input
/// yields `0.0`.
pub fn clamp_half_non_negative(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 2.0).round() / 2.0;
    if rounded < 0.0 {
        0.0
    } else {
        // Normalizes -0.0.
        rounded + 0.0
    }
}

/// How a reconciled value was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MergeKind {
    /// The server still held the baseline; the local edit was applied as is.
    Direct,
    /// The server had moved; the edit was replayed as a relative adjustment.
    Rebased { adjustment: f64 },
}

/// Result of reconciling one [`EditRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub value: f64,
    pub kind: MergeKind,
}

impl Reconciliation {
    pub fn of(edit: &EditRecord) -> Self {
        let value = reconcile(edit.baseline, edit.local_edit, edit.server_value);
        let kind = if edit.has_drifted() {
            MergeKind::Rebased {
                adjustment: edit.adjustment(),
            }
        } else {
            MergeKind::Direct
        };
        Self { value, kind }
    }

    pub fn was_rebased(&self) -> bool {
        matches!(self.kind, MergeKind::Rebased { .. })
    }
}
