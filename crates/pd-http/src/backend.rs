use reqwest::header::ACCEPT;
use reqwest::redirect::Policy;
use reqwest::{Client, Method, RequestBuilder, Response};
use url::Url;

use pd_store::{StoreError, StoreResult};

use crate::config::RemoteConfig;
use crate::error::{transport, HttpResult};

/// REST client for the issue tracker.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: RemoteConfig,
}

impl HttpBackend {
    /// Build a backend with its own client.
    pub fn new(config: RemoteConfig) -> HttpResult<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build a backend around an existing client.
    ///
    /// The client must not follow redirects: deferred writes answer `303`
    /// with the task location, which is only visible if the redirect is
    /// handed back unfollowed.
    pub fn with_client(client: Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Verify the credentials against the current-user endpoint.
    pub async fn check_connection(&self) -> StoreResult<bool> {
        let url = self.endpoint(["rest", "api", "3", "myself"]);
        let response = self.request(Method::GET, url).send().await.map_err(transport)?;
        tracing::debug!(status = %response.status(), "connection check");
        Ok(response.status().is_success())
    }

    /// `base_url` extended with percent-encoded path segments.
    pub(crate) fn endpoint<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.config.base_url.clone();
        // RemoteConfig rejects cannot-be-a-base URLs, so this always applies.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Resolve a `Location` header, which may be relative to the base URL.
    pub(crate) fn resolve(&self, location: &str) -> StoreResult<Url> {
        self.config
            .base_url
            .join(location)
            .map_err(|e| StoreError::InvalidResponse(format!("bad task location {location}: {e}")))
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.email, Some(&self.config.token))
            .header(ACCEPT, "application/json")
    }
}

/// Body text of a failed response, for error messages.
pub(crate) async fn error_body(response: Response) -> String {
    response.text().await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(RemoteConfig::new(base, "me@example.com", "token").unwrap()).unwrap()
    }

    #[test]
    fn endpoint_appends_segments() {
        let b = backend("https://example.atlassian.net");
        let url = b.endpoint(["rest", "api", "3", "issue", "ABC-1"]);
        assert_eq!(url.as_str(), "https://example.atlassian.net/rest/api/3/issue/ABC-1");
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let b = backend("https://example.com/jira/");
        let url = b.endpoint(["rest", "api", "3", "myself"]);
        assert_eq!(url.as_str(), "https://example.com/jira/rest/api/3/myself");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let b = backend("https://example.com");
        let url = b.endpoint(["issue", "a b/c"]);
        assert_eq!(url.as_str(), "https://example.com/issue/a%20b%2Fc");
    }

    #[test]
    fn resolves_relative_and_absolute_locations() {
        let b = backend("https://example.com");
        assert_eq!(
            b.resolve("/rest/api/3/task/7").unwrap().as_str(),
            "https://example.com/rest/api/3/task/7"
        );
        assert_eq!(
            b.resolve("https://tasks.example.com/t/1").unwrap().as_str(),
            "https://tasks.example.com/t/1"
        );
    }
}
