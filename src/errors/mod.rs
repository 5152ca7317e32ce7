//! Error types for the TargetProcess client.

mod classify;

pub use classify::{classify, ApiErrorBody};

use crate::types::{RateLimit, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for TargetProcess operations.
pub type TargetProcessResult<T> = Result<T, TargetProcessError>;

/// What went wrong below HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The call exceeded its timeout.
    Timeout,
    /// The connection could not be established (DNS, refused, TLS).
    Connect,
    /// The request could not be sent.
    Request,
    /// The response body could not be read.
    Body,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Request => write!(f, "request"),
            Self::Body => write!(f, "body"),
        }
    }
}

/// One field-level validation problem reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    /// Human readable message.
    #[serde(default, alias = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine readable code.
    #[serde(default, alias = "Code", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Offending field.
    #[serde(default, alias = "Field", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Resource the field belongs to.
    #[serde(default, alias = "Resource", skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Details of a non-2xx response.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    /// HTTP status code.
    pub status: u16,
    /// Best-effort message from the body, or a fixed default.
    pub message: String,
    /// Field-level errors, if the body carried any.
    pub errors: Vec<ApiErrorDetail>,
    /// Documentation link, if the body carried one.
    pub documentation_url: Option<String>,
    /// The raw response.
    pub response: Box<Response>,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {})", self.message, self.status)
    }
}

/// Every terminal failure of a logical call.
#[derive(Debug, Error)]
pub enum TargetProcessError {
    /// Transport-level failure, timeouts included.
    #[error("[network/{kind}] {message}")]
    Network {
        /// Failure category.
        kind: NetworkErrorKind,
        /// Description.
        message: String,
    },

    /// The call was cancelled before it completed.
    #[error("[cancelled] request was cancelled")]
    Cancelled,

    /// Request encoding or response decoding failed.
    #[error("[serialization] {message}")]
    Serialization {
        /// Description.
        message: String,
        /// Underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// 401.
    #[error("[authorization] {0}")]
    Authorization(ApiFailure),

    /// 403.
    #[error("[forbidden] {0}")]
    Forbidden(ApiFailure),

    /// 403 caused by too many failed logins.
    #[error("[login_attempts_exceeded] {0}")]
    LoginAttemptsExceeded(ApiFailure),

    /// 403 caused by an exhausted quota.
    #[error("[rate_limit_exceeded] {failure} (limit {}, remaining {}, resets {})", .rate_limit.limit, .rate_limit.remaining, .rate_limit.reset)]
    RateLimitExceeded {
        /// Response details.
        failure: ApiFailure,
        /// Quota at the time of the response.
        rate_limit: RateLimit,
    },

    /// 404.
    #[error("[not_found] {0}")]
    NotFound(ApiFailure),

    /// 422.
    #[error("[unprocessable_entity] {0}")]
    UnprocessableEntity(ApiFailure),

    /// Any other non-2xx status.
    #[error("[api] {0}")]
    Api(ApiFailure),

    /// The API broke the protocol, e.g. a pagination loop.
    #[error("[protocol] {message}")]
    Protocol {
        /// Description.
        message: String,
    },

    /// A caller-supplied argument was unusable.
    #[error("[invalid_argument] {message}")]
    InvalidArgument {
        /// Description.
        message: String,
    },

    /// The client configuration was rejected.
    #[error("[configuration] {message}")]
    Configuration {
        /// Description.
        message: String,
    },
}

impl TargetProcessError {
    /// Creates a network error.
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::network(NetworkErrorKind::Timeout, message)
    }

    /// Creates a serialization error with its JSON cause.
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        let message = format!("{}: {}", message.into(), source);
        Self::Serialization {
            message,
            source: Some(source),
        }
    }

    /// Creates a serialization error without an underlying cause.
    pub fn serialization_message(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Details of the HTTP response, for status-derived errors.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Authorization(f)
            | Self::Forbidden(f)
            | Self::LoginAttemptsExceeded(f)
            | Self::NotFound(f)
            | Self::UnprocessableEntity(f)
            | Self::Api(f) => Some(f),
            Self::RateLimitExceeded { failure, .. } => Some(failure),
            Self::Network { .. }
            | Self::Cancelled
            | Self::Serialization { .. }
            | Self::Protocol { .. }
            | Self::InvalidArgument { .. }
            | Self::Configuration { .. } => None,
        }
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.failure().map(|f| f.status)
    }

    /// Gets the human readable message.
    pub fn message(&self) -> String {
        match self {
            Self::Network { message, .. }
            | Self::Serialization { message, .. }
            | Self::Protocol { message }
            | Self::InvalidArgument { message }
            | Self::Configuration { message } => message.clone(),
            Self::Cancelled => "request was cancelled".to_string(),
            other => other
                .failure()
                .map(|f| f.message.clone())
                .unwrap_or_default(),
        }
    }

    /// Field-level errors reported by the API.
    pub fn field_errors(&self) -> &[ApiErrorDetail] {
        self.failure().map(|f| f.errors.as_slice()).unwrap_or(&[])
    }

    /// The raw response behind a status-derived error.
    pub fn response(&self) -> Option<&Response> {
        self.failure().map(|f| f.response.as_ref())
    }

    /// Gets the rate limit snapshot carried by the error or its response.
    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match self {
            Self::RateLimitExceeded { rate_limit, .. } => Some(rate_limit),
            other => other
                .failure()
                .and_then(|f| f.response.api_info.rate_limit.as_ref()),
        }
    }

    /// Seconds until the rate limit window resets, for quota errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { rate_limit, .. } => {
                let now = Utc::now();
                if rate_limit.reset > now {
                    Some((rate_limit.reset - now).num_seconds() as u64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Returns true if repeating the call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimitExceeded { .. } => true,
            Self::Api(f) => f.status >= 500,
            _ => false,
        }
    }
}

/// Checks if an error is a quota error.
pub fn is_rate_limit_error(error: &TargetProcessError) -> bool {
    matches!(error, TargetProcessError::RateLimitExceeded { .. })
}
