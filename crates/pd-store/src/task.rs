//! Deferred task polling.

use std::time::Duration;

use serde_json::Value;

/// Fields a task status body may report its state in, in lookup order.
const STATUS_FIELDS: [&str; 4] = ["status", "state", "currentStatus", "elementType"];

const SUCCESS_KEYWORDS: [&str; 2] = ["COMPLETE", "SUCCESS"];
const FAILURE_KEYWORDS: [&str; 2] = ["FAILED", "ERROR"];

/// Terminal (or not) state of a deferred write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// No terminal state was observed within the polling budget.
    Pending,
    Success,
    Failure,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// How long to wait for a deferred task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskPolling {
    /// Delay before each poll.
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for TaskPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(800),
            max_attempts: 20,
        }
    }
}

/// Classify a reported status by case-insensitive keyword.
///
/// Returns `None` while the task is still running (or reports something
/// unrecognized).
pub fn classify_status(text: &str) -> Option<TaskOutcome> {
    let upper = text.to_ascii_uppercase();
    if SUCCESS_KEYWORDS.iter().any(|k| upper.contains(k)) {
        Some(TaskOutcome::Success)
    } else if FAILURE_KEYWORDS.iter().any(|k| upper.contains(k)) {
        Some(TaskOutcome::Failure)
    } else {
        None
    }
}

/// The first non-empty string status field of a task body.
pub fn status_text(body: &Value) -> Option<&str> {
    STATUS_FIELDS
        .iter()
        .filter_map(|field| body.get(field).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}
