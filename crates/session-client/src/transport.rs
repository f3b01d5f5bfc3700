//! Transport seam and the reqwest-backed implementation
//!
//! The pipeline talks to the network only through `Transport`: one method
//! for ordinary requests, one for the refresh exchange. Keeping the refresh
//! exchange on its own method means it never re-enters the pipeline, so a
//! 401 from the refresh endpoint cannot trigger another refresh.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use common::Token;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use session_auth::TokenResponse;
use tracing::debug;

/// Transport-level failure: no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Everything needed to (re)send one request.
///
/// `retried` is set once by the pipeline before a replay and never cleared,
/// so a replayed request that expires again is not refreshed a second time.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
    request_id: String,
    retried: bool,
    notify_errors: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            retried: false,
            notify_errors: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Keep failures of this request away from the notifier. The error is
    /// still returned to the caller.
    pub fn without_notifications(mut self) -> Self {
        self.notify_errors = false;
        self
    }

    /// Identifier used in logs for this request and its replay.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Whether a replay after refresh has already been attempted.
    pub fn retried(&self) -> bool {
        self.retried
    }

    pub fn notify_errors(&self) -> bool {
        self.notify_errors
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// A received HTTP response, any status.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: Bytes) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body parsed as JSON, or None if it is empty or not JSON.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network access used by the pipeline and the refresh coordinator.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Send one request, attaching `bearer` as the Authorization header when
    /// present. Non-2xx statuses are returned as `Ok`.
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        bearer: Option<&'a Token>,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>>;

    /// Run the refresh exchange for the given refresh credential.
    fn refresh<'a>(
        &'a self,
        refresh: &'a Token,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenResponse>> + Send + 'a>>;
}

/// `Transport` over a shared `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    refresh_path: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, refresh_path: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            refresh_path: refresh_path.into(),
        }
    }

    /// Resolve a request path against the base URL. Absolute URLs pass through.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        }
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        bearer: Option<&'a Token>,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let mut headers = request.headers.clone();
            if let Some(token) = bearer {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                    .map_err(|e| TransportError::new(format!("invalid credential header: {e}")))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            } else {
                headers.remove(AUTHORIZATION);
            }

            let url = self.url_for(&request.path);
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(headers);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::new(format!("reading response body: {e}")))?;

            debug!(url = %url, status, bytes = body.len(), "response received");
            Ok(Response {
                status,
                headers,
                body,
            })
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh: &'a Token,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.url_for(&self.refresh_path);
            session_auth::refresh_token(&self.client, &url, refresh).await
        })
    }
}
