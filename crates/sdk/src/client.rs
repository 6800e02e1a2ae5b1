//! Low-level request dispatch
//!
//! Joins request paths onto the configured server, maps non-success
//! responses to [`SdkError::Api`] and optionally retries once on HTTP 429.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SdkError};

/// Request body variants
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as `application/json`
    Json(Value),
    /// Serialized as `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// A request relative to the configured server
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path joined onto the server origin, or an absolute URL
    pub path: String,
    /// Optional body
    pub body: Option<RequestBody>,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// HTTP basic credentials (user, password)
    pub basic_auth: Option<(String, String)>,
}

impl ApiRequest {
    /// Start a request with no body or headers
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, headers: Vec::new(), basic_auth: None }
    }

    /// GET request
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Attach a form body
    #[must_use]
    pub fn form<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.body =
            Some(RequestBody::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect()));
        self
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Authenticate with HTTP basic credentials
    #[must_use]
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }
}

/// A fully buffered response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Body as text
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON
    ///
    /// # Errors
    /// Returns `SdkError::Parse` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| SdkError::Parse(e.to_string()))
    }
}

/// HTTP dispatcher bound to one server origin
#[derive(Debug, Clone)]
pub struct ApiClient {
    server: String,
    http: Client,
    handle_rate_limit: bool,
    rate_limit_delay: Duration,
}

impl ApiClient {
    /// Client for `server`, trailing slashes trimmed
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        http: Client,
        handle_rate_limit: bool,
        rate_limit_delay: Duration,
    ) -> Self {
        let server = server.into().trim_end_matches('/').to_string();
        Self { server, http, handle_rate_limit, rate_limit_delay }
    }

    /// Absolute URL for a request path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.server)
        } else {
            format!("{}/{path}", self.server)
        }
    }

    /// Dispatch a request and return the buffered response
    ///
    /// # Errors
    /// Returns `SdkError::Http` on transport failure and `SdkError::Api` for
    /// any non-success status.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.dispatch(request).await?;

        if response.status == StatusCode::TOO_MANY_REQUESTS.as_u16() && self.handle_rate_limit {
            let wait = retry_after(&response.headers).unwrap_or(self.rate_limit_delay);
            debug!(path = %request.path, wait_ms = wait.as_millis(), "rate limited, retrying once");
            tokio::time::sleep(wait).await;
            let retried = self.dispatch(request).await?;
            return check_status(retried);
        }

        check_status(response)
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }

        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        debug!(method = %request.method, %url, "sending HTTP request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(method = %request.method, %url, status, "received HTTP response");

        Ok(ApiResponse { status, headers, body })
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn check_status(response: ApiResponse) -> Result<ApiResponse> {
    if (200..300).contains(&response.status) {
        return Ok(response);
    }

    let message = error_message(&response);
    Err(SdkError::Api { status: response.status, message })
}

/// Pick the most specific message an error response carries
fn error_message(response: &ApiResponse) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&response.body) {
        for field in ["message", "error_description", "description"] {
            if let Some(Value::String(text)) = map.get(field) {
                if !text.is_empty() {
                    return text.clone();
                }
            }
        }
    }

    let body = response.body.trim();
    if !body.is_empty() {
        return body.to_string();
    }

    match StatusCode::from_u16(response.status).ok().and_then(|s| s.canonical_reason()) {
        Some(reason) => format!("HTTP {} {reason}", response.status),
        None => format!("HTTP {}", response.status),
    }
}
