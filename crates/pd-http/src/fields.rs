//! The edited numeric field, read and written through the issue resource.

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde_json::{json, Map, Value};

use pd_commit::{FieldError, FieldResult, FieldService, FieldSnapshot};
use pd_merge::clamp_half_non_negative;
use pd_types::EntityId;

use crate::backend::{error_body, HttpBackend};
use crate::error::field_transport;

impl HttpBackend {
    fn issue_url(&self, key: &str) -> url::Url {
        self.endpoint(["rest", "api", "3", "issue", key])
    }

    async fn field_status(&self, key: &str, response: Response) -> FieldError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return FieldError::NotFound(key.to_string());
        }
        FieldError::Status {
            key: key.to_string(),
            status: status.as_u16(),
            body: error_body(response).await,
        }
    }
}

/// The numeric issue id; the API reports it as a string.
fn parse_entity_id(issue: &Value) -> Option<EntityId> {
    match issue.get("id")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64().and_then(|n| EntityId::new(n).ok()),
        _ => None,
    }
}

fn parse_snapshot(key: &str, field_id: &str, issue: &Value) -> FieldResult<FieldSnapshot> {
    let entity_id = parse_entity_id(issue);
    if entity_id.is_none() {
        tracing::warn!(issue = key, "issue has no usable numeric id");
    }
    let value = match issue.get("fields").and_then(|f| f.get(field_id)) {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(other) => {
            return Err(FieldError::InvalidResponse(format!(
                "{key}: field {field_id} is not numeric: {other}"
            )))
        }
    };
    Ok(FieldSnapshot { entity_id, value })
}

#[async_trait]
impl FieldService for HttpBackend {
    async fn read_field(&self, key: &str) -> FieldResult<FieldSnapshot> {
        let field_id = self.config().field_id.as_str();
        let mut url = self.issue_url(key);
        url.query_pairs_mut().append_pair("fields", field_id);

        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(field_transport)?;
        if !response.status().is_success() {
            return Err(self.field_status(key, response).await);
        }
        let issue: Value = response
            .json()
            .await
            .map_err(|e| FieldError::InvalidResponse(format!("{key}: {e}")))?;
        parse_snapshot(key, field_id, &issue)
    }

    async fn write_field(&self, key: &str, value: f64) -> FieldResult<()> {
        let value = clamp_half_non_negative(value);
        let mut fields = Map::new();
        fields.insert(self.config().field_id.clone(), json!(value));

        let response = self
            .request(Method::PUT, self.issue_url(key))
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(field_transport)?;
        if !response.status().is_success() {
            return Err(self.field_status(key, response).await);
        }
        tracing::debug!(issue = key, value, "field written");
        Ok(())
    }
}
