//! HTTP transport layer.

mod error;
mod http;
mod reqwest_transport;

pub use error::TransportError;
pub use http::{HttpRequest, HttpResponse, HttpTransport, BINARY_CONTENT_TYPE, TEXT_CONTENT_TYPE};
pub use reqwest_transport::ReqwestTransport;
