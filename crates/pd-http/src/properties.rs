//! Entity properties over the REST API.
//!
//! Reads go through the per-issue property resource. Conditional writes use
//! the bulk property endpoint with a filter on a single entity id, which is
//! the only place the API exposes `hasProperty` / `currentValue` guards.
//! The bulk endpoint usually answers `303 See Other` with the location of an
//! asynchronous task; that becomes [`WriteOutcome::Deferred`].

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use pd_store::{
    classify_status, status_text, Predicate, PropertyStore, StoreError, StoreResult, TaskOutcome,
    TaskPolling, WriteOutcome,
};
use pd_types::{EntityId, TaskHandle};

use crate::backend::{error_body, HttpBackend};
use crate::error::transport;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityFilter<'a> {
    entity_ids: [u64; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    has_property: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_value: Option<&'a Value>,
}

#[derive(Serialize)]
struct BulkSet<'a> {
    filter: EntityFilter<'a>,
    value: &'a Value,
}

impl<'a> EntityFilter<'a> {
    fn for_set(entity: EntityId, predicate: &'a Predicate) -> Self {
        let (has_property, current_value) = match predicate {
            Predicate::Absent => (false, None),
            Predicate::EqualTo(current) => (true, Some(current)),
        };
        Self {
            entity_ids: [entity.get()],
            has_property: Some(has_property),
            current_value,
        }
    }

    /// The bulk delete body is the filter itself, without a wrapper.
    fn for_delete(entity: EntityId, expected: &'a Value) -> Self {
        Self {
            entity_ids: [entity.get()],
            has_property: None,
            current_value: Some(expected),
        }
    }
}

impl HttpBackend {
    fn bulk_property_url(&self, key: &str) -> url::Url {
        self.endpoint(["rest", "api", "3", "issue", "properties", key])
    }

    /// Map a bulk write response onto a [`WriteOutcome`].
    async fn write_outcome(&self, response: Response) -> StoreResult<WriteOutcome> {
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_owned);

        match (status.as_u16(), location) {
            (200 | 202 | 204 | 303, Some(location)) => {
                let task = self.resolve(&location)?;
                tracing::debug!(%status, task = %task, "property write deferred");
                Ok(WriteOutcome::Deferred(TaskHandle::new(task.as_str())))
            }
            (200 | 202 | 204, None) => Ok(WriteOutcome::Committed),
            (303, None) => Err(StoreError::InvalidResponse(
                "303 without a task location".into(),
            )),
            (code, _) => Err(StoreError::status(code, error_body(response).await)),
        }
    }
}

#[async_trait]
impl PropertyStore for HttpBackend {
    async fn read(&self, entity: EntityId, key: &str) -> StoreResult<Option<Value>> {
        let id = entity.to_string();
        let url = self.endpoint(["rest", "api", "3", "issue", id.as_str(), "properties", key]);
        let response = self.request(Method::GET, url).send().await.map_err(transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::status(status.as_u16(), error_body(response).await));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        Ok(match body.get("value") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        })
    }

    async fn conditional_set(
        &self,
        entity: EntityId,
        key: &str,
        predicate: &Predicate,
        value: &Value,
    ) -> StoreResult<WriteOutcome> {
        let body = BulkSet {
            filter: EntityFilter::for_set(entity, predicate),
            value,
        };
        let response = self
            .request(Method::PUT, self.bulk_property_url(key))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        self.write_outcome(response).await
    }

    async fn conditional_delete(
        &self,
        entity: EntityId,
        key: &str,
        expected: &Value,
    ) -> StoreResult<WriteOutcome> {
        let body = EntityFilter::for_delete(entity, expected);
        let response = self
            .request(Method::DELETE, self.bulk_property_url(key))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        self.write_outcome(response).await
    }

    async fn poll_task(
        &self,
        handle: &TaskHandle,
        polling: TaskPolling,
    ) -> StoreResult<TaskOutcome> {
        let url = url::Url::parse(handle.as_str())
            .map_err(|e| StoreError::InvalidResponse(format!("bad task location {handle}: {e}")))?;

        for attempt in 1..=polling.max_attempts {
            tokio::time::sleep(polling.interval).await;

            let response = match self.request(Method::GET, url.clone()).send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::debug!(attempt, status = %response.status(), "task poll rejected");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "task poll failed");
                    continue;
                }
            };
            let Ok(body) = response.json::<Value>().await else {
                continue;
            };
            if let Some(outcome) = status_text(&body).and_then(classify_status) {
                tracing::debug!(attempt, ?outcome, task = %handle, "task finished");
                return Ok(outcome);
            }
        }
        Ok(TaskOutcome::Pending)
    }
}
