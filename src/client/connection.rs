//! Executes logical calls: encode, authenticate, send, record, classify.

use crate::auth::CredentialProvider;
use crate::config::TargetProcessConfig;
use crate::errors::{classify, TargetProcessError, TargetProcessResult};
use crate::observability::{Metrics, RequestTimer, TracingHooks};
use crate::rate_limit::RateLimitTracker;
use crate::request::RequestBuilder;
use crate::serialization::{Expect, JsonPipeline};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::types::{ApiResponse, BodyShape, Request, Response};
use reqwest::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured timeout for this call.
    pub timeout: Option<Duration>,
    /// Cancels the call, or a whole pagination run, when triggered.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns true if the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Everything one logical call needs, shared by all calls of a client.
pub struct Connection {
    config: TargetProcessConfig,
    base_address: Url,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    pipeline: JsonPipeline,
    rate_limits: Arc<RateLimitTracker>,
    metrics: Arc<Metrics>,
}

impl Connection {
    /// Creates a connection.
    pub fn new(
        config: TargetProcessConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
        rate_limits: Arc<RateLimitTracker>,
    ) -> TargetProcessResult<Self> {
        config.validate()?;
        let base_address = config.base_address()?;
        let pipeline = JsonPipeline::new(&config.media_type)?;

        Ok(Self {
            config,
            base_address,
            transport,
            credentials,
            pipeline,
            rate_limits,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &TargetProcessConfig {
        &self.config
    }

    /// Gets the API base address.
    pub fn base_address(&self) -> &Url {
        &self.base_address
    }

    /// Gets the shared rate limit state.
    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limits
    }

    /// Gets the metrics.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Builds a request against this connection's base address.
    pub fn request(&self, builder: RequestBuilder) -> TargetProcessResult<Request> {
        builder.build(&self.base_address)
    }

    /// Sends a request and returns the successful response undecoded.
    ///
    /// Every received response updates the shared rate limit state before it
    /// is classified.
    pub async fn send(&self, request: Request, options: &CallOptions) -> TargetProcessResult<Response> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "targetprocess_request",
            %request_id,
            method = %request.method,
        );

        self.send_inner(request, options).instrument(span).await
    }

    async fn send_inner(&self, request: Request, options: &CallOptions) -> TargetProcessResult<Response> {
        let method = request.method.to_string();
        let url = request.url()?.to_string();

        if options.is_cancelled() {
            self.metrics.record_cancelled();
            TracingHooks::on_request_cancelled(&method, &url);
            return Err(TargetProcessError::Cancelled);
        }

        let exchange = self.exchange(request, options.timeout);
        let outcome = match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    outcome = exchange => Some(outcome),
                }
            }
            None => Some(exchange.await),
        };

        let (timer, result) = match outcome {
            Some(outcome) => outcome?,
            None => {
                self.metrics.record_cancelled();
                TracingHooks::on_request_cancelled(&method, &url);
                return Err(TargetProcessError::Cancelled);
            }
        };

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                timer.failure();
                TracingHooks::on_request_error(&method, &url, &e.to_string());
                return Err(e.into());
            }
        };

        let response = Response::from(raw);
        self.rate_limits.update(&response.api_info);
        if let Some(rate_limit) = &response.api_info.rate_limit {
            TracingHooks::on_rate_limit_update(rate_limit);
        }

        if response.is_success() {
            TracingHooks::on_request_complete(
                &method,
                &url,
                response.status.as_u16(),
                timer.elapsed(),
            );
            timer.success();
            return Ok(response);
        }

        let error = classify(response);
        if let TargetProcessError::RateLimitExceeded { rate_limit, .. } = &error {
            self.metrics.record_rate_limited();
            TracingHooks::on_rate_limit_exceeded(rate_limit);
        }
        timer.failure();
        TracingHooks::on_request_error(&method, &url, &error.to_string());
        Err(error)
    }

    /// Prepares and performs the network exchange. Dropping the returned
    /// future abandons the request and releases its connection.
    async fn exchange(
        &self,
        request: Request,
        timeout: Option<Duration>,
    ) -> TargetProcessResult<(RequestTimer, Result<HttpResponse, TransportError>)> {
        let mut request = self.pipeline.serialize_request(request)?;
        if timeout.is_some() {
            request.timeout = timeout;
        }

        if !request.headers.contains_key(USER_AGENT) {
            let value = HeaderValue::from_str(&self.config.user_agent).map_err(|_| {
                TargetProcessError::configuration("User agent is not a valid header value")
            })?;
            request.headers.insert(USER_AGENT, value);
        }

        if !request.headers.contains_key(AUTHORIZATION) {
            let header = self
                .credentials
                .resolve()
                .await
                .and_then(|c| c.authorization_header());
            if let Some(header) = header {
                let mut value = HeaderValue::from_str(&header).map_err(|_| {
                    TargetProcessError::invalid_argument("Credentials contain invalid characters")
                })?;
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
        }

        let http = HttpRequest::from_request(request)?;
        let limit = http.timeout.unwrap_or(self.config.timeout);

        TracingHooks::on_request_start(http.method.as_str(), http.url.as_str());
        TracingHooks::on_request_headers(&http.headers);

        let timer = RequestTimer::new(self.metrics.clone());
        let result = match tokio::time::timeout(limit, self.transport.send(http)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(format!(
                "no response within {} ms",
                limit.as_millis()
            ))),
        };

        Ok((timer, result))
    }

    /// Sends a request and decodes the response body.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: Request,
        expect: Expect,
        options: &CallOptions,
    ) -> TargetProcessResult<ApiResponse<T>> {
        let url = request.url()?;
        let response = self.send(request, options).await?;
        let decoded = self.pipeline.deserialize_response::<T>(response, expect)?;

        if decoded.shape == BodyShape::WrappedSingleObject {
            self.metrics.record_single_object_wrapped();
            TracingHooks::on_single_object_wrapped(url.as_str(), std::any::type_name::<T>());
        }

        Ok(decoded)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_address", &self.base_address.as_str())
            .field("user_agent", &self.config.user_agent)
            .finish_non_exhaustive()
    }
}
