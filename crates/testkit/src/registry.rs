//! Mock registry adapter over `wiremock`
//!
//! Every registration mounts a one-shot (or `repeat`-shot) mock on the
//! underlying [`MockServer`] and appends an entry to an ordered ledger.
//! Expectations registered for the same method and path coexist; the engine
//! serves them first registered, first matched, each until its repeat budget
//! is spent. The ledger replays the server's recorded requests through the
//! same rule to answer [`MockRegistry::all_consumed`].
//!
//! Exact paths are normalized the way wiremock normalizes them: a missing
//! leading `/` is added, and a query string is split into pairs that must
//! all be present on the request (extra pairs are allowed).

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::{form_urlencoded, Url};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::error::{HarnessError, HarnessResult};

/// How a registered expectation matches the request path
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Path must equal `path`; every `query` pair must be present
    Exact {
        /// Absolute path, always starting with `/`
        path: String,
        /// Decoded query pairs, in the order written
        query: Vec<(String, String)>,
    },
    /// Path must match this regular expression
    Regex(Regex),
}

impl PathMatcher {
    /// Match a path, optionally followed by `?` and a query string
    #[must_use]
    pub fn exact(raw: &str) -> Self {
        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
        let query = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self::Exact { path, query }
    }

    /// Match paths against a regular expression
    ///
    /// # Errors
    /// Returns the regex compilation error for an invalid pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    fn matches(&self, url: &Url) -> bool {
        match self {
            Self::Exact { path, query } => {
                path == url.path()
                    && query.iter().all(|(k, v)| {
                        url.query_pairs().any(|(rk, rv)| rk == k.as_str() && rv == v.as_str())
                    })
            }
            Self::Regex(re) => re.is_match(url.path()),
        }
    }
}

impl fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { path, query } => {
                f.write_str(path)?;
                for (i, (k, v)) in query.iter().enumerate() {
                    write!(f, "{}{k}={v}", if i == 0 { '?' } else { '&' })?;
                }
                Ok(())
            }
            Self::Regex(re) => write!(f, "~{}", re.as_str()),
        }
    }
}

impl From<&str> for PathMatcher {
    fn from(value: &str) -> Self {
        Self::exact(value)
    }
}

impl From<String> for PathMatcher {
    fn from(value: String) -> Self {
        Self::exact(&value)
    }
}

/// Scripted response payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Serialized as JSON
    Json(Value),
    /// Passed through untouched
    Raw(String),
}

/// Response returned when an expectation matches
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSpec {
    /// Body to send
    pub payload: Payload,
    /// HTTP status code
    pub status: u16,
    /// Reason phrase; recorded and logged, not sent
    pub status_text: String,
    /// Explicit headers; `None` lets a JSON payload default its content type
    pub headers: Option<Vec<(String, String)>>,
}

impl ResponseSpec {
    /// JSON response with status 200
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self::with_payload(Payload::Json(body))
    }

    /// Raw string response with status 200
    #[must_use]
    pub fn raw(body: impl Into<String>) -> Self {
        Self::with_payload(Payload::Raw(body.into()))
    }

    fn with_payload(payload: Payload) -> Self {
        Self { payload, status: 200, status_text: "OK".to_string(), headers: None }
    }

    /// Set the HTTP status
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set the reason phrase
    #[must_use]
    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    /// Add an explicit header, disabling the JSON content-type default
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Vec::new).push((name.into(), value.into()));
        self
    }

    /// Headers that will be sent, defaults applied
    #[must_use]
    pub fn effective_headers(&self) -> Vec<(String, String)> {
        match (&self.headers, &self.payload) {
            (Some(headers), _) => headers.clone(),
            (None, Payload::Json(_)) => {
                vec![("Content-Type".to_string(), "application/json".to_string())]
            }
            (None, Payload::Raw(_)) => Vec::new(),
        }
    }

    /// Body bytes as they go on the wire
    #[must_use]
    pub fn body(&self) -> String {
        match &self.payload {
            Payload::Json(value) => value.to_string(),
            Payload::Raw(text) => text.clone(),
        }
    }

    fn to_template(&self) -> ResponseTemplate {
        let headers = self.effective_headers();

        // wiremock sets Content-Type from the body mime, overriding any
        // inserted header of the same name
        let content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map_or("text/plain", |(_, value)| value.as_str());

        let mut template =
            ResponseTemplate::new(self.status).set_body_raw(self.body(), content_type);
        for (name, value) in headers.iter().filter(|(n, _)| !n.eq_ignore_ascii_case("content-type"))
        {
            template = template.insert_header(name.as_str(), value.as_str());
        }
        template
    }
}

/// One registered expectation
#[derive(Debug, Clone)]
pub struct Expectation {
    /// Method the request must use
    pub method: Method,
    /// Path (and query) the request must match
    pub path: PathMatcher,
    /// Number of requests served before the expectation is exhausted
    pub repeat: u64,
    /// Response returned on a match
    pub response: ResponseSpec,
}

impl Expectation {
    fn matches(&self, request: &Request) -> bool {
        request.method.as_str() == self.method.as_str() && self.path.matches(&request.url)
    }

    fn describe(&self, served: u64) -> String {
        format!("{} {} ({served}/{})", self.method, self.path, self.repeat)
    }
}

struct RegistryInner {
    server: MockServer,
    http: reqwest::Client,
    ledger: Mutex<Vec<Expectation>>,
    restores: AtomicUsize,
}

impl fmt::Debug for RegistryInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryInner")
            .field("server", &self.server.uri())
            .field("expectations", &self.ledger.lock().len())
            .field("restores", &self.restores.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Registry of scripted HTTP expectations bound to one mock server
///
/// Cloning is cheap; clones share the server and ledger.
#[derive(Debug, Clone)]
pub struct MockRegistry {
    inner: Arc<RegistryInner>,
}

impl MockRegistry {
    /// Start a fresh mock server and an empty ledger
    ///
    /// # Errors
    /// Returns `HarnessError::Registry` if the HTTP client for the server
    /// cannot be built.
    pub async fn start() -> HarnessResult<Self> {
        let server = MockServer::start().await;
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| HarnessError::Registry(format!("http client: {e}")))?;

        debug!(uri = %server.uri(), "mock registry started");
        Ok(Self {
            inner: Arc::new(RegistryInner {
                server,
                http,
                ledger: Mutex::new(Vec::new()),
                restores: AtomicUsize::new(0),
            }),
        })
    }

    /// Origin all expectations are matched against; fixed for the registry's
    /// lifetime
    #[must_use]
    pub fn base_url(&self) -> String {
        self.inner.server.uri()
    }

    /// Client whose requests reach this registry's server
    #[must_use]
    pub fn http_client(&self) -> reqwest::Client {
        self.inner.http.clone()
    }

    /// Register an expectation served `repeat` times (at least once)
    ///
    /// Existing expectations for the same method and path are kept and
    /// served first.
    pub async fn register_call(
        &self,
        method_: Method,
        path_: impl Into<PathMatcher>,
        response: ResponseSpec,
        repeat: u64,
    ) {
        let expectation =
            Expectation { method: method_, path: path_.into(), repeat: repeat.max(1), response };

        let builder = Mock::given(method(expectation.method.as_str()));
        let builder = match &expectation.path {
            PathMatcher::Exact { path: p, query } => query
                .iter()
                .fold(builder.and(path(p.as_str())), |b, (k, v)| {
                    b.and(query_param(k.as_str(), v.as_str()))
                }),
            PathMatcher::Regex(re) => builder.and(path_regex(re.as_str())),
        };

        builder
            .respond_with(expectation.response.to_template())
            .up_to_n_times(expectation.repeat)
            .named(expectation.describe(0))
            .mount(&self.inner.server)
            .await;

        debug!(
            method = %expectation.method,
            path = %expectation.path,
            repeat = expectation.repeat,
            status = expectation.response.status,
            status_text = %expectation.response.status_text,
            "expectation registered"
        );
        self.inner.ledger.lock().push(expectation);
    }

    /// Register a single-use expectation
    pub async fn register_once(
        &self,
        method_: Method,
        path_: impl Into<PathMatcher>,
        response: ResponseSpec,
    ) {
        self.register_call(method_, path_, response, 1).await;
    }

    /// Drop every expectation and the recorded call history
    ///
    /// Safe to call repeatedly and with nothing registered.
    pub async fn restore(&self) {
        self.inner.server.reset().await;
        let dropped = {
            let mut ledger = self.inner.ledger.lock();
            let n = ledger.len();
            ledger.clear();
            n
        };
        self.inner.restores.fetch_add(1, Ordering::SeqCst);
        debug!(dropped, "mock registry restored");
    }

    /// Whether every registered expectation has been served its full repeat
    /// count
    ///
    /// # Errors
    /// Returns `HarnessError::Registry` if the server is not recording
    /// requests.
    pub async fn all_consumed(&self) -> HarnessResult<bool> {
        Ok(self.pending().await?.is_empty())
    }

    /// Descriptions of expectations that still have unserved calls
    ///
    /// # Errors
    /// Returns `HarnessError::Registry` if the server is not recording
    /// requests.
    pub async fn pending(&self) -> HarnessResult<Vec<String>> {
        let served = self.served_counts().await?;
        let ledger = self.inner.ledger.lock();
        Ok(ledger
            .iter()
            .zip(served)
            .filter(|(expectation, n)| *n < expectation.repeat)
            .map(|(expectation, n)| expectation.describe(n))
            .collect())
    }

    /// Number of recorded requests no expectation answered
    ///
    /// # Errors
    /// Returns `HarnessError::Registry` if the server is not recording
    /// requests.
    pub async fn unmatched_count(&self) -> HarnessResult<usize> {
        let requests = self.received().await?;
        let ledger = self.inner.ledger.lock().clone();
        let mut served = vec![0u64; ledger.len()];
        Ok(requests.iter().filter(|r| assign(&ledger, &mut served, r).is_none()).count())
    }

    /// Snapshot of registered expectations in registration order
    #[must_use]
    pub fn expectations(&self) -> Vec<Expectation> {
        self.inner.ledger.lock().clone()
    }

    /// How many times [`restore`](Self::restore) has run
    #[must_use]
    pub fn restore_count(&self) -> usize {
        self.inner.restores.load(Ordering::SeqCst)
    }

    async fn served_counts(&self) -> HarnessResult<Vec<u64>> {
        let requests = self.received().await?;
        let ledger = self.inner.ledger.lock().clone();
        let mut served = vec![0u64; ledger.len()];
        for request in &requests {
            assign(&ledger, &mut served, request);
        }
        Ok(served)
    }

    async fn received(&self) -> HarnessResult<Vec<Request>> {
        self.inner
            .server
            .received_requests()
            .await
            .ok_or_else(|| HarnessError::Registry("request recording is disabled".to_string()))
    }
}

/// Credit a request to the first expectation that matches it and still has
/// budget, returning that expectation's index
fn assign(ledger: &[Expectation], served: &mut [u64], request: &Request) -> Option<usize> {
    let index =
        (0..ledger.len()).find(|&i| served[i] < ledger[i].repeat && ledger[i].matches(request))?;
    served[index] += 1;
    Some(index)
}
