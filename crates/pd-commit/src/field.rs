use async_trait::async_trait;
use pd_types::EntityId;

use crate::error::FieldResult;

/// Current state of the edited field on the server.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSnapshot {
    /// Numeric id of the issue, when the server reported one.
    pub entity_id: Option<EntityId>,
    /// Field value; an unset field reads as `0.0`.
    pub value: f64,
}

/// Access to the numeric field being edited, addressed by issue key.
#[async_trait]
pub trait FieldService: Send + Sync {
    async fn read_field(&self, key: &str) -> FieldResult<FieldSnapshot>;

    /// Overwrite the field. Writing the same value twice is harmless.
    async fn write_field(&self, key: &str, value: f64) -> FieldResult<()>;
}
