//! In-memory field service for tests and simulation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use pd_types::EntityId;

use crate::error::{FieldError, FieldResult};
use crate::field::{FieldService, FieldSnapshot};

#[derive(Debug, Default)]
struct Issues {
    fields: HashMap<String, FieldSnapshot>,
    failing: HashSet<String>,
    read_only: HashSet<String>,
    writes: usize,
}

/// A [`FieldService`] backed by a `HashMap` of issue key to snapshot.
#[derive(Debug, Default)]
pub struct InMemoryFieldService {
    issues: RwLock<Issues>,
}

impl InMemoryFieldService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite an issue.
    pub fn insert(&self, key: impl Into<String>, entity_id: Option<EntityId>, value: f64) {
        let mut issues = self.issues.write().unwrap_or_else(|e| e.into_inner());
        issues.fields.insert(key.into(), FieldSnapshot { entity_id, value });
    }

    /// Current value of an issue's field.
    pub fn value(&self, key: &str) -> Option<f64> {
        let issues = self.issues.read().unwrap_or_else(|e| e.into_inner());
        issues.fields.get(key).map(|s| s.value)
    }

    /// Make every read and write of `key` fail with a 500 status.
    pub fn fail_key(&self, key: impl Into<String>) {
        let mut issues = self.issues.write().unwrap_or_else(|e| e.into_inner());
        issues.failing.insert(key.into());
    }

    /// Make writes of `key` fail with a 400 status while reads keep working.
    pub fn reject_writes(&self, key: impl Into<String>) {
        let mut issues = self.issues.write().unwrap_or_else(|e| e.into_inner());
        issues.read_only.insert(key.into());
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.issues.read().unwrap_or_else(|e| e.into_inner()).writes
    }

    fn check(issues: &Issues, key: &str) -> FieldResult<()> {
        if issues.failing.contains(key) {
            return Err(FieldError::Status {
                key: key.to_string(),
                status: 500,
                body: "injected fault".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FieldService for InMemoryFieldService {
    async fn read_field(&self, key: &str) -> FieldResult<FieldSnapshot> {
        let issues = self.issues.read().unwrap_or_else(|e| e.into_inner());
        Self::check(&issues, key)?;
        issues
            .fields
            .get(key)
            .copied()
            .ok_or_else(|| FieldError::NotFound(key.to_string()))
    }

    async fn write_field(&self, key: &str, value: f64) -> FieldResult<()> {
        let mut issues = self.issues.write().unwrap_or_else(|e| e.into_inner());
        Self::check(&issues, key)?;
        if issues.read_only.contains(key) {
            return Err(FieldError::Status {
                key: key.to_string(),
                status: 400,
                body: "field is not editable".into(),
            });
        }
        let snapshot = issues
            .fields
            .get_mut(key)
            .ok_or_else(|| FieldError::NotFound(key.to_string()))?;
        snapshot.value = value;
        issues.writes += 1;
        Ok(())
    }
}
