//! HTTP transport for the GitHub REST API.
//!
//! [`GitHubStorage`](crate::GitHubStorage) talks to the API through the
//! [`Transport`] trait. [`UreqTransport`] is the production implementation; tests
//! plug in an in-memory repository instead.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use ureq::Agent;

use folio_storage::{ErrorStatus, StorageError, StorageErrorKind};

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// GitHub REST API version header value.
const API_VERSION: &str = "2022-11-28";

/// Characters left unescaped in a path segment or query component.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// HTTP method used by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A request against the API, independent of the HTTP client.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Unencoded path below the API base URL (e.g. `/repos/acme/site/contents/posts/a.md`).
    pub path: String,
    /// Query parameters, unencoded.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request without query or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Query parameter value by key.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A response from the API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `x-ratelimit-remaining` header, if present.
    pub rate_limit_remaining: Option<u64>,
    /// Raw response body.
    pub body: String,
}

impl ApiResponse {
    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::Other`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_json::from_str(&self.body)
            .map_err(|e| StorageError::new(StorageErrorKind::Other).with_source(e))
    }
}

/// Sends [`ApiRequest`]s to a GitHub-compatible API.
pub trait Transport: Send + Sync {
    /// Send a request and return the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] only when no response was received (network
    /// failure, timeout).
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, StorageError>;
}

/// Blocking HTTP transport built on `ureq`.
pub struct UreqTransport {
    agent: Agent,
    api_url: String,
    token: Option<String>,
}

impl UreqTransport {
    /// Create a transport for `api_url` (e.g. `https://api.github.com`).
    ///
    /// `token` is sent as a bearer token when present.
    #[must_use]
    pub fn new(api_url: &str, token: Option<String>) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            api_url: api_url.trim_end_matches('/').to_owned(),
            token,
        }
    }

    /// Build the full URL with percent-encoded path segments and query.
    fn url(&self, request: &ApiRequest) -> String {
        let path = request
            .path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!("{}{}", self.api_url, path);
        for (index, (key, value)) in request.query.iter().enumerate() {
            url.push(if index == 0 { '?' } else { '&' });
            url.push_str(&utf8_percent_encode(key, SEGMENT).to_string());
            url.push('=');
            url.push_str(&utf8_percent_encode(value, SEGMENT).to_string());
        }
        url
    }

    fn with_headers<B>(&self, builder: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let builder = builder
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", concat!("folio/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => builder.header("Authorization", &format!("Bearer {token}")),
            None => builder,
        }
    }
}

fn transport_error(err: ureq::Error) -> StorageError {
    let (kind, status) = match err {
        ureq::Error::Timeout(_) => (StorageErrorKind::Timeout, ErrorStatus::Temporary),
        _ => (StorageErrorKind::Unavailable, ErrorStatus::Temporary),
    };
    StorageError::new(kind).with_status(status).with_source(err)
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, StorageError> {
        let url = self.url(request);
        let body = request.body.as_ref();

        let response = match request.method {
            Method::Get => self.with_headers(self.agent.get(&url)).call(),
            Method::Delete => {
                let builder = self.with_headers(self.agent.delete(&url));
                match body {
                    Some(json) => builder.force_send_body().send_json(json),
                    None => builder.call(),
                }
            }
            Method::Put | Method::Post | Method::Patch => {
                let builder = match request.method {
                    Method::Put => self.agent.put(&url),
                    Method::Post => self.agent.post(&url),
                    _ => self.agent.patch(&url),
                };
                let builder = self.with_headers(builder);
                match body {
                    Some(json) => builder.send_json(json),
                    None => builder.send_empty(),
                }
            }
        }
        .map_err(transport_error)?;

        let status = response.status().as_u16();
        let rate_limit_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response
            .into_body()
            .read_to_string()
            .map_err(transport_error)?;

        Ok(ApiResponse {
            status,
            rate_limit_remaining,
            body,
        })
    }
}
