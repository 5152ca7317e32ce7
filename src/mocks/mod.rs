//! Mock transport for testing code built on the TargetProcess client.

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
    /// Headers.
    pub headers: Vec<(String, String)>,
    /// Delay before responding.
    pub delay: Option<std::time::Duration>,
    /// Fail at the transport level instead of responding.
    pub failure: Option<MockFailure>,
}

/// Transport failure a mock can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection refused.
    Connect,
    /// Timed out.
    Timeout,
}

impl MockResponse {
    /// Creates a response with a status and raw body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
            delay: None,
            failure: None,
        }
    }

    /// Creates a JSON response.
    pub fn json_with_status<T: Serialize + ?Sized>(status: u16, body: &T) -> Self {
        Self::new(status, serde_json::to_vec(body).unwrap_or_default())
            .with_header("content-type", "application/json; charset=utf-8")
    }

    /// Creates a successful JSON response.
    pub fn ok<T: Serialize + ?Sized>(body: &T) -> Self {
        Self::json_with_status(200, body)
    }

    /// Creates a 201 Created response.
    pub fn created<T: Serialize + ?Sized>(body: &T) -> Self {
        Self::json_with_status(201, body)
    }

    /// Creates a 204 No Content response.
    pub fn no_content() -> Self {
        Self::new(204, Bytes::new())
    }

    /// Creates a 404 Not Found response.
    pub fn not_found(message: &str) -> Self {
        Self::json_with_status(404, &serde_json::json!({ "Status": "NotFound", "Message": message }))
    }

    /// Creates a 401 Unauthorized response.
    pub fn unauthorized(message: &str) -> Self {
        Self::json_with_status(401, &serde_json::json!({ "message": message }))
    }

    /// Creates a 403 Forbidden response.
    pub fn forbidden(message: &str) -> Self {
        Self::json_with_status(403, &serde_json::json!({ "message": message }))
    }

    /// Creates a 422 Validation Failed response.
    pub fn validation_failed(message: &str, errors: Vec<(&str, &str, &str)>) -> Self {
        let errors: Vec<_> = errors
            .into_iter()
            .map(|(resource, field, code)| {
                serde_json::json!({
                    "resource": resource,
                    "field": field,
                    "code": code
                })
            })
            .collect();

        Self::json_with_status(
            422,
            &serde_json::json!({
                "message": message,
                "errors": errors
            }),
        )
    }

    /// Creates a rate limit exceeded response.
    pub fn rate_limited() -> Self {
        let reset_at = Utc::now() + Duration::minutes(1);
        Self::json_with_status(403, &serde_json::json!({ "message": "API rate limit exceeded" }))
            .with_rate_limit(5000, 0, reset_at.timestamp())
    }

    /// Creates a 500 Internal Server Error response.
    pub fn server_error(message: &str) -> Self {
        Self::json_with_status(500, &serde_json::json!({ "message": message }))
    }

    /// Creates a connection failure.
    pub fn connection_refused() -> Self {
        Self {
            failure: Some(MockFailure::Connect),
            ..Self::new(0, Bytes::new())
        }
    }

    /// Creates a 304 Not Modified response.
    pub fn not_modified() -> Self {
        Self::new(304, Bytes::new()).with_header("etag", "\"v1\"")
    }

    /// Creates a transport timeout.
    pub fn timed_out() -> Self {
        Self {
            failure: Some(MockFailure::Timeout),
            ..Self::new(0, Bytes::new())
        }
    }

    /// Adds a delay to the response.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Adds a header to the response.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds rate limit headers.
    pub fn with_rate_limit(self, limit: u32, remaining: u32, reset_timestamp: i64) -> Self {
        self.with_header("x-ratelimit-limit", &limit.to_string())
            .with_header("x-ratelimit-remaining", &remaining.to_string())
            .with_header("x-ratelimit-reset", &reset_timestamp.to_string())
    }

    /// Adds a `Link` header pointing at the next page.
    pub fn with_next_link(self, url: &str) -> Self {
        self.with_header("link", &format!("<{}>; rel=\"next\"", url))
    }

    fn to_http(&self) -> Result<HttpResponse, TransportError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| TransportError::Request(format!("Invalid mock status: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Request(format!("Invalid mock header: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Request(format!("Invalid mock header: {}", e)))?;
            headers.append(name, value);
        }

        Ok(HttpResponse {
            status,
            headers,
            body: self.body.clone(),
        })
    }
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// HTTP method.
    pub method: String,
    /// Full URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
}

impl MockRequest {
    /// Looks up a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Default behavior for unmatched requests.
#[derive(Debug, Clone, Copy, Default)]
pub enum DefaultBehavior {
    /// Return 404 for unmatched requests.
    #[default]
    NotFound,
    /// Fail at the transport level.
    Error,
    /// Panic on unmatched requests.
    Panic,
}

/// In-memory [`HttpTransport`] serving queued responses by method and URL.
///
/// Responses registered for the same key are served in order.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: Arc<RwLock<HashMap<String, Vec<MockResponse>>>>,
    requests: Arc<RwLock<Vec<MockRequest>>>,
    default_behavior: DefaultBehavior,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default behavior for unmatched requests.
    pub fn with_default_behavior(mut self, behavior: DefaultBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    fn key(method: &str, url: &str) -> String {
        format!("{} {}", method.to_uppercase(), url)
    }

    /// Registers a response for a method and absolute URL.
    pub fn register(&self, method: &str, url: &str, response: MockResponse) {
        self.responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(Self::key(method, url))
            .or_default()
            .push(response);
    }

    /// Registers a GET response.
    pub fn on_get(&self, url: &str, response: MockResponse) {
        self.register("GET", url, response);
    }

    /// Registers a POST response.
    pub fn on_post(&self, url: &str, response: MockResponse) {
        self.register("POST", url, response);
    }

    /// Registers a PUT response.
    pub fn on_put(&self, url: &str, response: MockResponse) {
        self.register("PUT", url, response);
    }

    /// Registers a DELETE response.
    pub fn on_delete(&self, url: &str, response: MockResponse) {
        self.register("DELETE", url, response);
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gets the number of recorded requests.
    pub fn request_count(&self) -> usize {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Clears recorded requests.
    pub fn clear_requests(&self) {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Asserts that a request was made.
    pub fn assert_requested(&self, method: &str, url: &str) {
        let found = self
            .requests()
            .iter()
            .any(|r| r.method.eq_ignore_ascii_case(method) && r.url == url);
        assert!(found, "Expected request {} {} was not made", method, url);
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method.to_string();
        let url = request.url.to_string();

        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockRequest {
                method: method.clone(),
                url: url.clone(),
                headers: request.headers,
                body: request.body,
                timestamp: Utc::now(),
            });

        let response = {
            let mut store = self.responses.write().unwrap_or_else(PoisonError::into_inner);
            store
                .get_mut(&Self::key(&method, &url))
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };

        let Some(response) = response else {
            return match self.default_behavior {
                DefaultBehavior::NotFound => MockResponse::not_found(&format!(
                    "No mock response for {} {}",
                    method, url
                ))
                .to_http(),
                DefaultBehavior::Error => Err(TransportError::Request(format!(
                    "No mock response for {} {}",
                    method, url
                ))),
                DefaultBehavior::Panic => panic!("No mock response for {} {}", method, url),
            };
        };

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        match response.failure {
            Some(MockFailure::Connect) => Err(TransportError::Connect(format!(
                "connection refused: {}",
                url
            ))),
            Some(MockFailure::Timeout) => Err(TransportError::Timeout(format!(
                "mock timeout: {}",
                url
            ))),
            None => response.to_http(),
        }
    }
}
