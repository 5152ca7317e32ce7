//! Assembles logical requests and merges query parameters into endpoints.

use crate::errors::{TargetProcessError, TargetProcessResult};
use crate::types::{Request, RequestBody};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Characters left unescaped in query values.
const QUERY_VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Query parameter whose value is passed through exactly as supplied.
pub const RAW_QUERY_PARAMETER: &str = "q";

/// Builds a [`Request`] from its parts.
///
/// Setters never fail; the first invalid input is reported by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    endpoint: Option<String>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: RequestBody,
    content_type: Option<String>,
    timeout: Option<Duration>,
    error: Option<String>,
}

impl RequestBuilder {
    /// Creates a builder for a method and endpoint.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: Some(endpoint.into()),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            content_type: None,
            timeout: None,
            error: None,
        }
    }

    /// Creates a builder from an optional endpoint; `None` fails on build.
    pub fn from_parts(method: Method, endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            ..Self::new(method, String::new())
        }
    }

    /// GET request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// POST request.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// PUT request.
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    /// PATCH request.
    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    /// DELETE request.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Sets a header, replacing any previous value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => self.fail(format!("Invalid header '{}'", name)),
        }
        self
    }

    /// Sets several headers at once.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Adds a query parameter. A later value for the same key wins.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.query.push((key, value)),
        }
        self
    }

    /// Adds query parameters from a serializable struct or map.
    pub fn query_params<P: Serialize + ?Sized>(mut self, params: &P) -> Self {
        match serde_urlencoded::to_string(params) {
            Ok(encoded) => {
                let pairs: Vec<(String, String)> = url::form_urlencoded::parse(encoded.as_bytes())
                    .into_owned()
                    .collect();
                for (key, value) in pairs {
                    self = self.query(key, value);
                }
            }
            Err(e) => self.fail(format!("Failed to serialize query parameters: {}", e)),
        }
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a structured body to be encoded as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match RequestBody::json(value) {
            Ok(body) => self.body = body,
            Err(e) => self.fail(e.message()),
        }
        self
    }

    /// Sets the accepted media type.
    pub fn accept(self, media_type: &str) -> Self {
        self.header(ACCEPT.as_str(), media_type)
    }

    /// Sets the body content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets a per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    /// Produces the request against a base address.
    pub fn build(self, base_address: &Url) -> TargetProcessResult<Request> {
        if let Some(message) = self.error {
            return Err(TargetProcessError::invalid_argument(message));
        }

        let endpoint = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| TargetProcessError::invalid_argument("endpoint must not be empty"))?;

        let request = Request {
            method: self.method,
            base_address: base_address.clone(),
            endpoint: apply_parameters(&endpoint, &self.query),
            headers: self.headers,
            body: self.body,
            content_type: self.content_type,
            timeout: self.timeout,
        };

        // Reject endpoints that cannot form a URL before anything is sent.
        request.url()?;
        Ok(request)
    }
}

/// Merges query parameters into an endpoint and returns the new endpoint.
///
/// Supplied parameters come first and replace any existing parameter with the
/// same key; the remaining existing parameters follow in their original order.
/// Values are percent-encoded, except those of [`RAW_QUERY_PARAMETER`].
pub fn apply_parameters(endpoint: &str, parameters: &[(String, String)]) -> String {
    if parameters.is_empty() {
        return endpoint.to_string();
    }

    let (path, existing) = match endpoint.split_once('?') {
        Some((path, query)) => (path, query),
        None => (endpoint, ""),
    };

    let mut merged: Vec<String> = parameters
        .iter()
        .map(|(key, value)| encode_pair(key, value))
        .collect();

    for pair in existing.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if parameters.iter().any(|(k, _)| k == key) {
            continue;
        }
        if key == RAW_QUERY_PARAMETER {
            merged.push(format!("{}={}", key, value));
        } else {
            let decoded = percent_decode_str(value).decode_utf8_lossy();
            merged.push(encode_pair(key, &decoded));
        }
    }

    format!("{}?{}", path, merged.join("&"))
}

fn encode_pair(key: &str, value: &str) -> String {
    if key == RAW_QUERY_PARAMETER {
        format!("{}={}", key, value)
    } else {
        format!("{}={}", key, utf8_percent_encode(value, QUERY_VALUE_SET))
    }
}
