//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, trace};
use url::Url;

use crate::api::{ExecutionsApi, WorkflowsApi};
use crate::error::{Error, ErrorResponse, Result};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-n8n-api-key";

/// Path prefix of the public REST API.
const API_PREFIX: &str = "api/v1";

/// n8n API client.
///
/// Cheap to clone; clones share the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use flowtrace_client::N8nClient;
///
/// # async fn example() -> flowtrace_client::Result<()> {
/// let client = N8nClient::builder()
///     .base_url("http://localhost:5678")
///     .api_key("secret")
///     .build()?;
///
/// let workflow = client.workflows().get("Wk3yZ0").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct N8nClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client.
    pub(crate) http: reqwest::Client,
    /// Server root URL (without the API prefix).
    pub(crate) base_url: Url,
    /// Request timeout.
    pub(crate) timeout: Duration,
}

impl N8nClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the server root URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Editor URL of an execution, for humans to click.
    pub fn execution_url(&self, workflow_id: &str, execution_id: &str) -> String {
        format!(
            "{}workflow/{}/executions/{}",
            self.inner.base_url, workflow_id, execution_id
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the workflows API.
    pub fn workflows(&self) -> WorkflowsApi {
        WorkflowsApi::new(self.clone())
    }

    /// Access the executions API.
    pub fn executions(&self) -> ExecutionsApi {
        ExecutionsApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner
            .base_url
            .join(&format!("{}/{}", API_PREFIX, path))
            .map_err(Error::from)
    }

    /// Make a GET request.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(path, response).await
    }

    /// Make a GET request with query parameters.
    pub(crate) async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = self.url(path)?;
        debug!(%url, "GET (query)");
        let response = self
            .inner
            .http
            .get(url)
            .query(query)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(path, response).await
    }

    /// Make a DELETE request.
    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        debug!(%url, "DELETE");
        let response = self
            .inner
            .http
            .delete(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.extract_error(path, response).await);
        }

        Ok(())
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            let body = response.bytes().await?;
            trace!(path, bytes = body.len(), "response body received");
            Ok(serde_json::from_slice(&body)?)
        } else {
            Err(self.extract_error(path, response).await)
        }
    }

    /// Extract an error from a failed response.
    ///
    /// A 404 with a JSON error body means the resource is missing. A 404
    /// without one means the route itself is missing (public API disabled or
    /// not provisioned), which is a different problem for the operator.
    async fn extract_error(&self, path: &str, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorResponse>(&body).ok();

        debug!(status, path, "request failed");

        match (status, parsed) {
            (401 | 403, Some(err)) => Error::Auth(err.message),
            (401 | 403, None) => Error::Auth(format!("HTTP {}", status)),
            (404, Some(err)) => Error::NotFound(err.message),
            (404, None) | (501, _) => Error::MissingCapability(path.to_string()),
            (_, Some(err)) => Error::Api {
                status,
                message: err.message,
            },
            (_, None) => Error::Api {
                status,
                message: format!("HTTP {}", status),
            },
        }
    }
}

/// Builder for creating an N8nClient.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the server root URL (e.g. `https://n8n.example.com`).
    ///
    /// A trailing `/api/v1` is tolerated and stripped.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<N8nClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let trimmed = base_url.trim_end_matches('/');
        let trimmed = trimmed
            .strip_suffix(&format!("/{}", API_PREFIX))
            .unwrap_or(trimmed);
        let mut base_url = Url::parse(trimmed)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        // Build default headers
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| Error::Config("Invalid API key".to_string()))?;
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("flowtrace/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(N8nClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
