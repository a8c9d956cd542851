//! A stub tracker served over loopback HTTP for the backend tests.
//!
//! Every request lands in one fallback handler that dispatches on method and
//! path segments, which keeps the overlapping `issue/...` routes unambiguous.
//! Bulk property writes behave like the real service: they answer `303` with
//! a task location and the task reports `COMPLETE` even when the filter
//! matched nothing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::{HttpBackend, RemoteConfig, DEFAULT_FIELD_ID};

#[derive(Debug, Default)]
struct Tracker {
    properties: HashMap<(u64, String), Value>,
    issues: HashMap<String, (u64, Value)>,
    /// Task id to number of polls served so far.
    tasks: HashMap<u64, u32>,
    next_task: u64,
    broken: HashSet<String>,
    failing_tasks: bool,
    write_reply: WriteReply,
}

/// How bulk property writes are answered.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) enum WriteReply {
    /// `303 See Other` pointing at a new task.
    #[default]
    Task,
    /// Apply the write and answer `status`, with a task location or without.
    Applied { status: StatusCode, location: bool },
    /// Reject the write with `status` and leave the property alone.
    Rejected(StatusCode),
}

type Shared = Arc<Mutex<Tracker>>;

pub(crate) struct FakeTracker {
    state: Shared,
    base_url: String,
}

impl FakeTracker {
    pub(crate) async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            state,
            base_url: format!("http://{addr}"),
        }
    }

    pub(crate) fn config(&self) -> RemoteConfig {
        RemoteConfig::new(&self.base_url, "bot@example.com", "api-token").unwrap()
    }

    pub(crate) fn backend(&self) -> HttpBackend {
        HttpBackend::new(self.config()).unwrap()
    }

    pub(crate) fn add_issue(&self, key: &str, id: u64, points: Option<f64>) {
        let value = points.map(|p| json!(p)).unwrap_or(Value::Null);
        self.tracker().issues.insert(key.to_string(), (id, value));
    }

    pub(crate) fn points(&self, key: &str) -> Option<Value> {
        self.tracker().issues.get(key).map(|(_, v)| v.clone())
    }

    pub(crate) fn property(&self, id: u64, key: &str) -> Option<Value> {
        self.tracker().properties.get(&(id, key.to_string())).cloned()
    }

    pub(crate) fn put_property(&self, id: u64, key: &str, value: Value) {
        self.tracker().properties.insert((id, key.to_string()), value);
    }

    /// Every request touching property `key` answers 500.
    pub(crate) fn break_property(&self, key: &str) {
        self.tracker().broken.insert(key.to_string());
    }

    pub(crate) fn reply_to_writes(&self, reply: WriteReply) {
        self.tracker().write_reply = reply;
    }

    /// Tasks finish as `FAILED` instead of `COMPLETE`.
    pub(crate) fn fail_tasks(&self) {
        self.tracker().failing_tasks = true;
    }

    fn tracker(&self) -> std::sync::MutexGuard<'_, Tracker> {
        self.state.lock().unwrap()
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "errorMessages": [message] }))).into_response()
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
        return error(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => return error(StatusCode::BAD_REQUEST, "malformed json"),
        }
    };
    let query = uri.query().unwrap_or_default().to_string();
    let segments: Vec<&str> = uri
        .path()
        .trim_start_matches("/rest/api/3/")
        .split('/')
        .collect();

    let mut tracker = state.lock().unwrap();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["myself"]) => {
            Json(json!({"accountId": "abc", "active": true})).into_response()
        }
        ("PUT", ["issue", "properties", key]) => tracker.bulk_set(key, &body),
        ("DELETE", ["issue", "properties", key]) => tracker.bulk_delete(key, &body),
        ("GET", ["issue", id, "properties", key]) => tracker.get_property(id, key),
        ("GET", ["issue", key]) => tracker.get_issue(key, &query),
        ("PUT", ["issue", key]) => tracker.update_issue(key, &body),
        ("GET", ["task", id]) => tracker.task_status(id),
        _ => error(StatusCode::NOT_FOUND, "no such resource"),
    }
}

impl Tracker {
    fn queue_task(&mut self) -> String {
        self.next_task += 1;
        self.tasks.insert(self.next_task, 0);
        format!("/rest/api/3/task/{}", self.next_task)
    }

    /// Refuse the write before touching anything, if so configured.
    fn refuse_write(&self, key: &str) -> Option<Response> {
        if self.broken.contains(key) {
            return Some(error(StatusCode::INTERNAL_SERVER_ERROR, "property store down"));
        }
        match self.write_reply {
            WriteReply::Rejected(status) => Some(error(status, "write rejected")),
            _ => None,
        }
    }

    fn acknowledge_write(&mut self) -> Response {
        match self.write_reply {
            WriteReply::Applied {
                status,
                location: false,
            } => status.into_response(),
            WriteReply::Applied {
                status,
                location: true,
            } => {
                let location = self.queue_task();
                (status, [(header::LOCATION, location)]).into_response()
            }
            WriteReply::Task | WriteReply::Rejected(_) => {
                let location = self.queue_task();
                (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response()
            }
        }
    }

    fn bulk_set(&mut self, key: &str, body: &Value) -> Response {
        if let Some(refused) = self.refuse_write(key) {
            return refused;
        }
        let filter = &body["filter"];
        let (Some(ids), Some(value)) = (filter["entityIds"].as_array(), body.get("value")) else {
            return error(StatusCode::BAD_REQUEST, "missing filter or value");
        };
        for id in ids.iter().filter_map(Value::as_u64) {
            let slot = (id, key.to_string());
            let current = self.properties.get(&slot);
            let matches = match filter.get("hasProperty").and_then(Value::as_bool) {
                Some(false) => current.is_none(),
                Some(true) => current.is_some(),
                None => true,
            } && filter
                .get("currentValue")
                .map_or(true, |expected| current == Some(expected));
            if matches {
                self.properties.insert(slot, value.clone());
            }
        }
        self.acknowledge_write()
    }

    fn bulk_delete(&mut self, key: &str, body: &Value) -> Response {
        if let Some(refused) = self.refuse_write(key) {
            return refused;
        }
        let Some(ids) = body["entityIds"].as_array() else {
            return error(StatusCode::BAD_REQUEST, "missing entityIds");
        };
        for id in ids.iter().filter_map(Value::as_u64) {
            let slot = (id, key.to_string());
            let matches = body
                .get("currentValue")
                .map_or(true, |expected| self.properties.get(&slot) == Some(expected));
            if matches {
                self.properties.remove(&slot);
            }
        }
        self.acknowledge_write()
    }

    fn get_property(&self, id: &str, key: &str) -> Response {
        if self.broken.contains(key) {
            return error(StatusCode::INTERNAL_SERVER_ERROR, "property store down");
        }
        let Ok(id) = id.parse::<u64>() else {
            return error(StatusCode::NOT_FOUND, "issue does not exist");
        };
        match self.properties.get(&(id, key.to_string())) {
            Some(value) => Json(json!({"key": key, "value": value})).into_response(),
            None => error(StatusCode::NOT_FOUND, "property not found"),
        }
    }

    fn get_issue(&self, key: &str, query: &str) -> Response {
        let Some((id, points)) = self.issues.get(key) else {
            return error(StatusCode::NOT_FOUND, "issue does not exist");
        };
        let mut fields = serde_json::Map::new();
        if query.contains(DEFAULT_FIELD_ID) {
            fields.insert(DEFAULT_FIELD_ID.to_string(), points.clone());
        }
        Json(json!({"id": id.to_string(), "key": key, "fields": fields})).into_response()
    }

    fn update_issue(&mut self, key: &str, body: &Value) -> Response {
        let Some((_, points)) = self.issues.get_mut(key) else {
            return error(StatusCode::NOT_FOUND, "issue does not exist");
        };
        match body["fields"].get(DEFAULT_FIELD_ID) {
            Some(Value::Number(n)) => {
                *points = Value::Number(n.clone());
                StatusCode::NO_CONTENT.into_response()
            }
            _ => error(StatusCode::BAD_REQUEST, "field must be a number"),
        }
    }

    fn task_status(&mut self, id: &str) -> Response {
        let failing = self.failing_tasks;
        let Some(polls) = id.parse().ok().and_then(|id: u64| self.tasks.get_mut(&id)) else {
            return error(StatusCode::NOT_FOUND, "task not found");
        };
        *polls += 1;
        let status = match (*polls, failing) {
            (1, _) => "RUNNING",
            (_, false) => "COMPLETE",
            (_, true) => "FAILED",
        };
        Json(json!({"self": format!("/rest/api/3/task/{id}"), "status": status})).into_response()
    }
}
