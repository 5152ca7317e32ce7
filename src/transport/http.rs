//! Core HTTP transport abstractions.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use url::Url;

use super::error::TransportError;
use crate::errors::{TargetProcessError, TargetProcessResult};
use crate::types::{Request, RequestBody, Response};

/// Content type for raw text bodies without one.
pub const TEXT_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content type for raw byte bodies without one.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Wire-ready HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
    /// Per-call timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Lowers an encoded request to the wire.
    ///
    /// GET and HEAD never carry a body. A structured body that was not
    /// encoded first is rejected.
    pub fn from_request(request: Request) -> TargetProcessResult<Self> {
        let url = request.url()?;
        let read_only = request.is_read_only();
        let mut headers = request.headers;

        let (body, default_type) = match request.body {
            _ if read_only => (None, None),
            RequestBody::Empty => (None, None),
            RequestBody::Text(text) => (Some(Bytes::from(text)), Some(TEXT_CONTENT_TYPE.to_string())),
            RequestBody::Bytes(bytes) => (Some(bytes), Some(BINARY_CONTENT_TYPE.to_string())),
            RequestBody::Content(content) => (Some(content.bytes), Some(content.content_type)),
            RequestBody::Structured(_) => {
                return Err(TargetProcessError::serialization_message(
                    "Structured request body was not encoded before sending",
                ))
            }
        };

        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            if let Some(content_type) = request.content_type.or(default_type) {
                let value = HeaderValue::from_str(&content_type).map_err(|_| {
                    TargetProcessError::invalid_argument(format!(
                        "Invalid content type '{}'",
                        content_type
                    ))
                })?;
                headers.insert(CONTENT_TYPE, value);
            }
        }

        Ok(Self {
            method: request.method,
            url,
            headers,
            body,
            timeout: request.timeout,
        })
    }
}

/// Raw HTTP response from the transport layer.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl From<HttpResponse> for Response {
    fn from(raw: HttpResponse) -> Self {
        Response::new(raw.status, raw.headers, raw.body)
    }
}

/// HTTP transport abstraction for testability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and reads the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
