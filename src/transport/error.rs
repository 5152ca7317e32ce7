//! Transport layer error types.

use crate::errors::{NetworkErrorKind, TargetProcessError};

/// Failure below HTTP.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),
    /// The request could not be sent.
    #[error("Request failed: {0}")]
    Request(String),
    /// The response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    /// Network error category.
    pub fn kind(&self) -> NetworkErrorKind {
        match self {
            Self::Timeout(_) => NetworkErrorKind::Timeout,
            Self::Connect(_) => NetworkErrorKind::Connect,
            Self::Request(_) => NetworkErrorKind::Request,
            Self::Body(_) => NetworkErrorKind::Body,
        }
    }
}

impl From<TransportError> for TargetProcessError {
    fn from(error: TransportError) -> Self {
        TargetProcessError::network(error.kind(), error.to_string())
    }
}
