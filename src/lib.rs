//! # TargetProcess Integration Library
//!
//! A typed TargetProcess REST client core with:
//! - Pluggable credentials (basic, token, app) resolved per call
//! - Request building with query merging and JSON bodies
//! - A JSON pipeline that tolerates a lone object where a list is expected
//! - Rate limit tracking from response headers
//! - Lazy pagination over `Link` headers with loop detection
//! - Status-based error classification
//! - Cancellation and per-call timeouts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_targetprocess::TargetProcessClient;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Bug {
//!     #[serde(rename = "Id")]
//!     id: u64,
//!     #[serde(rename = "Name")]
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TargetProcessClient::builder()
//!         .base_url("https://acme.tpondemand.com")
//!         .token("xxxxxxxx")
//!         .build()?;
//!
//!     let bugs: Vec<Bug> = client.get_all("Bugs").await?;
//!     for bug in bugs {
//!         println!("#{} {}", bug.id, bug.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// Request construction and encoding
pub mod request;
pub mod serialization;

// HTTP client and transport
pub mod client;
pub mod transport;

// Pagination handling
pub mod pagination;

// Rate limit state
pub mod rate_limit;

// Observability
pub mod observability;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{
    AuthenticationType, CredentialProvider, Credentials, EnvCredentialProvider,
    InMemoryCredentialStore, LazyCredentialProvider,
};
pub use client::{CallOptions, Connection, TargetProcessClient, TargetProcessClientBuilder};
pub use config::{TargetProcessConfig, TargetProcessConfigBuilder};
pub use errors::{NetworkErrorKind, TargetProcessError, TargetProcessResult};
pub use pagination::{Page, PaginationLinks, Paginator, PaginatorState};
pub use rate_limit::{RateLimitTracker, TrackedState};
pub use request::RequestBuilder;
pub use serialization::{Expect, JsonPipeline};
pub use types::*;
