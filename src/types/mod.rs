//! Request and response model shared by every stage of the HTTP pipeline.

use crate::errors::{TargetProcessError, TargetProcessResult};
use crate::pagination::PaginationLinks;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;
use url::Url;

/// Media type a response must carry for its body to be decoded.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Request quota header.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Remaining requests header.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Window reset header (epoch seconds).
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

const OAUTH_SCOPES_HEADER: &str = "x-oauth-scopes";
const ACCEPTED_OAUTH_SCOPES_HEADER: &str = "x-accepted-oauth-scopes";

/// A pre-built wire payload with its own content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpContent {
    /// Content-Type sent with the payload.
    pub content_type: String,
    /// Payload bytes.
    pub bytes: Bytes,
}

impl HttpContent {
    /// Creates a new payload.
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Body of a logical request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Raw text, sent as-is.
    Text(String),
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Pre-built wire payload, sent as-is with its own content type.
    Content(HttpContent),
    /// Structured value, encoded to JSON text by the serialization pipeline.
    Structured(serde_json::Value),
}

impl RequestBody {
    /// Captures a serializable value as a structured body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> TargetProcessResult<Self> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| TargetProcessError::serialization("Failed to serialize request body", e))
    }

    /// Returns true if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns true for bodies that bypass JSON encoding.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Bytes(_) | Self::Content(_))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<HttpContent> for RequestBody {
    fn from(content: HttpContent) -> Self {
        Self::Content(content)
    }
}

/// A logical request, ready to be encoded and sent.
///
/// Produced by [`crate::request::RequestBuilder`]. Pipeline stages take it by
/// value and hand back a new one rather than mutating a shared template.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// API base address.
    pub base_address: Url,
    /// Endpoint relative to the base address, or an absolute URI, with any
    /// query parameters already merged in.
    pub endpoint: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Content-Type for the body, when the caller chose one.
    pub content_type: Option<String>,
    /// Per-call timeout.
    pub timeout: Option<Duration>,
}

impl Request {
    /// Resolves the absolute URL this request targets.
    pub fn url(&self) -> TargetProcessResult<Url> {
        let raw = if is_absolute(&self.endpoint) {
            self.endpoint.clone()
        } else {
            format!(
                "{}/{}",
                self.base_address.as_str().trim_end_matches('/'),
                self.endpoint.trim_start_matches('/')
            )
        };

        Url::parse(&raw).map_err(|e| {
            TargetProcessError::invalid_argument(format!("Invalid request URI '{}': {}", raw, e))
        })
    }

    /// Returns true for methods that never carry an encoded body.
    pub fn is_read_only(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Returns true if the named header is set.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

/// Returns true if the endpoint already names a scheme and host.
pub(crate) fn is_absolute(endpoint: &str) -> bool {
    endpoint.starts_with("http://") || endpoint.starts_with("https://")
}

/// Rate limit window snapshot. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// When the current window resets.
    pub reset: DateTime<Utc>,
}

impl RateLimit {
    /// Creates a snapshot.
    pub fn new(limit: u32, remaining: u32, reset: DateTime<Utc>) -> Self {
        Self {
            limit,
            remaining,
            reset,
        }
    }

    /// Reads the rate limit headers.
    ///
    /// Returns `None` unless `X-RateLimit-Remaining` is present and numeric. A
    /// missing limit reads as 0 and a missing reset as the Unix epoch.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_number::<u32>(headers, RATE_LIMIT_REMAINING_HEADER)?;
        let limit = header_number::<u32>(headers, RATE_LIMIT_LIMIT_HEADER).unwrap_or(0);
        let reset = header_number::<i64>(headers, RATE_LIMIT_RESET_HEADER)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default();

        Some(Self {
            limit,
            remaining,
            reset,
        })
    }

    /// Time left until the window resets, if it lies in the future.
    pub fn reset_in(&self) -> Option<Duration> {
        (self.reset - Utc::now()).to_std().ok()
    }
}

fn header_number<N: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<N> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Metadata the API reports in response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiInfo {
    /// Link relations from the `Link` header.
    pub links: PaginationLinks,
    /// Scopes granted to the token.
    pub oauth_scopes: Vec<String>,
    /// Scopes the endpoint accepts.
    pub accepted_oauth_scopes: Vec<String>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Rate limit snapshot.
    pub rate_limit: Option<RateLimit>,
}

impl ApiInfo {
    /// Derives the metadata from a response's headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            links: PaginationLinks::from_headers(headers),
            oauth_scopes: scope_list(headers, OAUTH_SCOPES_HEADER),
            accepted_oauth_scopes: scope_list(headers, ACCEPTED_OAUTH_SCOPES_HEADER),
            etag: headers
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            rate_limit: RateLimit::from_headers(headers),
        }
    }
}

fn scope_list(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// A received HTTP response. Owned by the caller that issued the call.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Media type of the body, without parameters.
    pub content_type: Option<String>,
    /// Raw body.
    pub body: Bytes,
    /// Metadata parsed from the headers.
    pub api_info: ApiInfo,
}

impl Response {
    /// Builds a response, parsing the content type and API metadata once.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type);
        let api_info = ApiInfo::from_headers(&headers);

        Self {
            status,
            headers,
            content_type,
            body,
            api_info,
        }
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// 2xx, or 304 Not Modified.
    pub fn is_success(&self) -> bool {
        self.status.is_success() || self.status == StatusCode::NOT_MODIFIED
    }

    /// Returns true if the body is declared as JSON.
    pub fn is_json(&self) -> bool {
        self.content_type.as_deref() == Some(JSON_MEDIA_TYPE)
    }

    /// Looks up a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Strips parameters from a Content-Type value.
fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// How the body of a successful response was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// Empty body or the `{}` sentinel.
    NoContent,
    /// 304 Not Modified.
    NotModified,
    /// Content type was not JSON; the body was left raw.
    NotJson,
    /// Decoded as-is.
    Json,
    /// A lone object was wrapped into a one-element list before decoding.
    WrappedSingleObject,
}

/// A response together with its decoded body.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    /// The HTTP response.
    pub http_response: Response,
    /// The decoded body, if any.
    pub body: Option<T>,
    /// How the body was treated.
    pub shape: BodyShape,
}

impl<T> ApiResponse<T> {
    /// Creates a response without a decoded body.
    pub fn empty(http_response: Response, shape: BodyShape) -> Self {
        Self {
            http_response,
            body: None,
            shape,
        }
    }

    /// Creates a response with a decoded body.
    pub fn with_body(http_response: Response, body: T, shape: BodyShape) -> Self {
        Self {
            http_response,
            body: Some(body),
            shape,
        }
    }

    /// API metadata of the response.
    pub fn api_info(&self) -> &ApiInfo {
        &self.http_response.api_info
    }

    /// Takes the body, failing if the response carried none.
    pub fn into_body(self) -> TargetProcessResult<T> {
        let status = self.http_response.status.as_u16();
        self.body.ok_or_else(|| {
            TargetProcessError::serialization_message(format!(
                "Expected a JSON body but the response carried none (HTTP {})",
                status
            ))
        })
    }
}
