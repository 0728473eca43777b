// Request pipeline
//
// Builds the absolute URL, runs the middleware chain, attaches auth and
// JSON headers, dispatches through `reqwest`, and maps non-2xx responses
// into `Error::Response`. One call at a time: a fair async mutex is held
// from URL construction until the body has been decoded.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use crate::auth_store::AuthStore;
use crate::error::Error;
use crate::models::ErrorEnvelope;

// ── Request options ──────────────────────────────────────────────────

/// One outbound call, as seen by middleware before dispatch.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Applied in order; later entries win on name conflicts.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn post(body: &impl Serialize) -> Result<Self, Error> {
        Self::new(Method::POST).with_body(body)
    }

    pub fn patch(body: &impl Serialize) -> Result<Self, Error> {
        Self::new(Method::PATCH).with_body(body)
    }

    pub fn with_body(mut self, body: &impl Serialize) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// ── Middleware ───────────────────────────────────────────────────────

/// What a `before_send` hook may change.
#[derive(Debug, Clone, Default)]
pub struct BeforeSendOverride {
    /// Replacement absolute URL.
    pub url: Option<String>,
    /// Merged over the caller's headers.
    pub headers: Vec<(String, String)>,
}

/// Request/response hook. Middleware runs in registration order.
pub trait Middleware: Send + Sync {
    /// Inspect the request before dispatch. `None` leaves it untouched.
    fn before_send(&self, _url: &str, _options: &RequestOptions) -> Option<BeforeSendOverride> {
        None
    }

    /// Transform a successful raw-JSON response body.
    fn after_send(&self, _url: &str, _status: u16, body: Value) -> Value {
        body
    }
}

// ── Decode strategies ────────────────────────────────────────────────

/// How the caller wants a successful body decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Parsed JSON value (`{}` for an empty body), passed through `after_send`.
    Json,
    /// Raw body text.
    Text,
    /// Body discarded.
    Empty,
}

/// Decoded body, one variant per [`ResponseKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Empty,
}

// ── URL building ─────────────────────────────────────────────────────

/// Join `base` and `path` with exactly one `/`, then append the query.
///
/// Each key and value is percent-encoded on its own; pairs are joined with
/// `&` and attached with `?`, or `&` if the path already has a query.
pub fn build_url(base: &str, path: &str, query: &[(String, String)]) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let mut url = if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    };

    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&encoded.join("&"));
    }

    url
}

pub(crate) fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        // `+` is ambiguous outside form bodies; keep spaces unambiguous.
        .replace('+', "%20")
}

// ── Pipeline ─────────────────────────────────────────────────────────

/// Serialized JSON request pipeline bound to one backend.
pub struct Pipeline {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthStore>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// `base_url` is validated here but stored as text; joining is done
    /// by [`build_url`].
    pub fn new(http: reqwest::Client, base_url: &str, auth: Arc<AuthStore>) -> Result<Self, Error> {
        Url::parse(base_url)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth,
            middleware: RwLock::new(Vec::new()),
            lock: Mutex::new(()),
        })
    }

    /// The normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_store(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    /// Append a middleware to the chain.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    /// Build an absolute URL against this pipeline's base.
    pub fn build_url(&self, path: &str, query: &[(String, String)]) -> String {
        build_url(&self.base_url, path, query)
    }

    // ── Entry points ─────────────────────────────────────────────────

    /// Send a request and decode the body according to `kind`.
    pub async fn send(
        &self,
        path: &str,
        options: RequestOptions,
        kind: ResponseKind,
    ) -> Result<Payload, Error> {
        let _guard = self.lock.lock().await;
        let (url, status, body) = self.execute(path, options).await?;

        Ok(match kind {
            ResponseKind::Json => {
                let value = parse_json_or_empty(&body)?;
                Payload::Json(self.run_after_send(&url, status, value))
            }
            ResponseKind::Text => Payload::Text(body),
            ResponseKind::Empty => Payload::Empty,
        })
    }

    /// Send a request and decode the body into `T` (empty body as `{}`).
    pub async fn send_as<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, Error> {
        let _guard = self.lock.lock().await;
        let (_url, _status, body) = self.execute(path, options).await?;

        let source = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(source).map_err(|e| deserialization_error(&e, body.clone()))
    }

    /// Raw JSON value, after `after_send` middleware.
    pub async fn send_value(&self, path: &str, options: RequestOptions) -> Result<Value, Error> {
        match self.send(path, options, ResponseKind::Json).await? {
            Payload::Json(value) => Ok(value),
            _ => Ok(Value::Object(serde_json::Map::new())),
        }
    }

    /// Raw body text.
    pub async fn send_text(&self, path: &str, options: RequestOptions) -> Result<String, Error> {
        match self.send(path, options, ResponseKind::Text).await? {
            Payload::Text(text) => Ok(text),
            _ => Ok(String::new()),
        }
    }

    /// Discard the body.
    pub async fn send_empty(&self, path: &str, options: RequestOptions) -> Result<(), Error> {
        self.send(path, options, ResponseKind::Empty).await?;
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Build, hook, dispatch. Returns the final URL, status and body text.
    /// Callers hold `self.lock`.
    async fn execute(
        &self,
        path: &str,
        mut options: RequestOptions,
    ) -> Result<(String, u16, String), Error> {
        let mut url = self.build_url(path, &options.query);

        for middleware in self.middleware_snapshot() {
            if let Some(over) = middleware.before_send(&url, &options) {
                if let Some(replacement) = over.url {
                    trace!(from = %url, to = %replacement, "middleware replaced URL");
                    url = replacement;
                }
                options.headers.extend(over.headers);
            }
        }

        let parsed = Url::parse(&url)?;
        let headers = self.build_headers(&options)?;

        debug!("{} {}", options.method, parsed);

        let mut request = self.http.request(options.method.clone(), parsed).headers(headers);
        if let Some(body) = &options.body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let resp = request.send().await?;
        let status = resp.status();

        if !status.is_success() {
            return Err(response_error(url, status, resp).await);
        }

        let body = resp.text().await?;
        trace!(status = status.as_u16(), bytes = body.len(), "response received");
        Ok((url, status.as_u16(), body))
    }

    fn build_headers(&self, options: &RequestOptions) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let token = self.auth.token();
        if !token.is_empty() {
            let mut value = header_value(AUTHORIZATION.as_str(), &token)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in &options.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value(name, value)?);
        }

        Ok(headers)
    }

    fn run_after_send(&self, url: &str, status: u16, mut value: Value) -> Value {
        for middleware in self.middleware_snapshot() {
            value = middleware.after_send(url, status, value);
        }
        value
    }

    fn middleware_snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_json_or_empty(body: &str) -> Result<Value, Error> {
    if body.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(body).map_err(|e| deserialization_error(&e, body.to_owned()))
}

fn deserialization_error(e: &serde_json::Error, body: String) -> Error {
    let preview: String = body.chars().take(200).collect();
    Error::Deserialization {
        message: format!("{e} (body preview: {preview:?})"),
        body,
    }
}

/// Decode the error envelope, or synthesize one from the status line.
async fn response_error(url: String, status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
    let raw = resp.text().await.unwrap_or_default();
    let envelope = serde_json::from_str::<ErrorEnvelope>(&raw).unwrap_or_else(|_| {
        ErrorEnvelope::synthetic(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status"),
        )
    });

    debug!(status = status.as_u16(), message = %envelope.message, "request failed");

    Error::Response {
        url,
        status: status.as_u16(),
        envelope,
    }
}
