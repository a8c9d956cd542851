use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{HttpError, HttpResult};

/// Story points field on Jira Cloud.
pub const DEFAULT_FIELD_ID: &str = "customfield_10022";

/// Where and as whom to talk to the tracker.
#[derive(Clone)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub email: String,
    pub token: String,
    /// Id of the numeric field being edited.
    pub field_id: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(
        base_url: &str,
        email: impl Into<String>,
        token: impl Into<String>,
    ) -> HttpResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| HttpError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(HttpError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            email: email.into(),
            token: token.into(),
            field_id: DEFAULT_FIELD_ID.into(),
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_field_id(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = field_id.into();
        self
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url.as_str())
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("field_id", &self.field_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
