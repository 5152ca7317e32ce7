//! TargetProcess API client implementation.

mod connection;

pub use connection::{CallOptions, Connection};

use crate::auth::{CredentialProvider, Credentials, EnvCredentialProvider, InMemoryCredentialStore};
use crate::config::{TargetProcessConfig, TargetProcessConfigBuilder};
use crate::errors::{TargetProcessError, TargetProcessResult};
use crate::observability::Metrics;
use crate::pagination::Paginator;
use crate::rate_limit::RateLimitTracker;
use crate::request::RequestBuilder;
use crate::serialization::Expect;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{ApiInfo, ApiResponse, RateLimit, Response};
use futures::Stream;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// TargetProcess API client.
///
/// Cheap to clone; clones share one connection and its rate limit state.
#[derive(Debug, Clone)]
pub struct TargetProcessClient {
    connection: Arc<Connection>,
}

impl TargetProcessClient {
    /// Creates a client over HTTP using the configured credentials, if any.
    pub fn new(config: TargetProcessConfig) -> TargetProcessResult<Self> {
        Self::builder_from(config).build()
    }

    /// Creates a new client builder.
    pub fn builder() -> TargetProcessClientBuilder {
        TargetProcessClientBuilder::new()
    }

    fn builder_from(config: TargetProcessConfig) -> TargetProcessClientBuilder {
        TargetProcessClientBuilder {
            config: Some(config),
            ..TargetProcessClientBuilder::new()
        }
    }

    /// Wraps an existing connection.
    pub fn with_connection(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Gets the connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        self.connection.base_address().as_str()
    }

    /// Metadata of the most recent response.
    pub fn last_api_info(&self) -> Option<Arc<ApiInfo>> {
        self.connection.rate_limits().last_api_info()
    }

    /// Most recent rate limit snapshot.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.connection.rate_limits().rate_limit()
    }

    /// Gets the metrics.
    pub fn metrics(&self) -> &Arc<Metrics> {
        self.connection.metrics()
    }

    /// Executes one logical call and decodes the body.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expect: Expect,
        options: &CallOptions,
    ) -> TargetProcessResult<ApiResponse<T>> {
        let request = self.connection.request(request)?;
        self.connection.execute(request, expect, options).await
    }

    /// Starts a paginated listing.
    pub fn paginate<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        options: CallOptions,
    ) -> TargetProcessResult<Paginator<T>> {
        let request = self.connection.request(request)?;
        Paginator::new(self.connection.clone(), request, options)
    }

    /// Makes a GET request.
    ///
    /// A collection target such as `Vec<T>` also accepts a lone object. A
    /// response without a body (204, 304 or `{}`) fails with a serialization
    /// error; use [`Self::get_optional`] when that is a valid outcome.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> TargetProcessResult<T> {
        self.execute(RequestBuilder::get(endpoint), Expect::of::<T>(), &CallOptions::default())
            .await?
            .into_body()
    }

    /// Makes a GET request, returning `None` when the response has no body.
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> TargetProcessResult<Option<T>> {
        Ok(self
            .execute(RequestBuilder::get(endpoint), Expect::of::<T>(), &CallOptions::default())
            .await?
            .body)
    }

    /// Makes a GET request with query parameters.
    pub async fn get_with_params<T: DeserializeOwned, P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &P,
    ) -> TargetProcessResult<T> {
        self.execute(
            RequestBuilder::get(endpoint).query_params(params),
            Expect::of::<T>(),
            &CallOptions::default(),
        )
        .await?
        .into_body()
    }

    /// Fetches every page of a listing.
    pub async fn get_all<T: DeserializeOwned>(&self, endpoint: &str) -> TargetProcessResult<Vec<T>> {
        self.paginate(RequestBuilder::get(endpoint), CallOptions::default())?
            .collect_all()
            .await
    }

    /// Fetches pages of a listing until `max_items` items are collected.
    pub async fn get_all_limited<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        max_items: usize,
    ) -> TargetProcessResult<Vec<T>> {
        self.paginate(RequestBuilder::get(endpoint), CallOptions::default())?
            .with_max_items(max_items)
            .collect_all()
            .await
    }

    /// Streams every item of a listing, fetching pages on demand.
    pub fn stream_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: CallOptions,
    ) -> TargetProcessResult<impl Stream<Item = TargetProcessResult<T>>> {
        Ok(self
            .paginate(RequestBuilder::get(endpoint), options)?
            .into_stream())
    }

    /// Makes a POST request.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> TargetProcessResult<T> {
        self.send_json(Method::POST, endpoint, body).await
    }

    /// Makes a PUT request.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> TargetProcessResult<T> {
        self.send_json(Method::PUT, endpoint, body).await
    }

    /// Makes a PATCH request.
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> TargetProcessResult<T> {
        self.send_json(Method::PATCH, endpoint, body).await
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, endpoint: &str) -> TargetProcessResult<()> {
        let request = self.connection.request(RequestBuilder::delete(endpoint))?;
        self.connection
            .send(request, &CallOptions::default())
            .await?;
        Ok(())
    }

    /// Makes a GET request and returns the raw response, e.g. for downloads.
    pub async fn get_raw(&self, endpoint: &str) -> TargetProcessResult<Response> {
        let request = self.connection.request(RequestBuilder::get(endpoint))?;
        self.connection.send(request, &CallOptions::default()).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> TargetProcessResult<T> {
        self.execute(
            RequestBuilder::new(method, endpoint).json(body),
            Expect::of::<T>(),
            &CallOptions::default(),
        )
        .await?
        .into_body()
    }
}

/// Builder for TargetProcessClient.
pub struct TargetProcessClientBuilder {
    config: Option<TargetProcessConfig>,
    config_builder: TargetProcessConfigBuilder,
    transport: Option<Arc<dyn HttpTransport>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    rate_limits: Option<Arc<RateLimitTracker>>,
}

impl TargetProcessClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            config_builder: TargetProcessConfig::builder(),
            transport: None,
            credentials: None,
            rate_limits: None,
        }
    }

    /// Sets the account address.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the User-Agent product identifier.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.user_agent(ua);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets static credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config_builder = self.config_builder.credentials(credentials);
        self
    }

    /// Sets a bearer token.
    pub fn token(self, token: impl Into<String>) -> Self {
        self.credentials(Credentials::token(token))
    }

    /// Reads credentials and settings from the environment.
    pub fn from_env(mut self) -> Self {
        self.config_builder = self.config_builder.from_env();
        self.credentials = Some(Arc::new(EnvCredentialProvider::new()));
        self
    }

    /// Sets the credential provider.
    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Sets the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares rate limit state with other clients.
    pub fn rate_limit_tracker(mut self, tracker: Arc<RateLimitTracker>) -> Self {
        self.rate_limits = Some(tracker);
        self
    }

    /// Builds the client.
    pub fn build(self) -> TargetProcessResult<TargetProcessClient> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build()?,
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config).map_err(|e| {
                TargetProcessError::configuration(e.to_string())
            })?),
        };

        let credentials: Arc<dyn CredentialProvider> = match self.credentials {
            Some(provider) => provider,
            None => Arc::new(match config.credentials.clone() {
                Some(credentials) => InMemoryCredentialStore::new(credentials),
                None => InMemoryCredentialStore::anonymous(),
            }),
        };

        let rate_limits = self.rate_limits.unwrap_or_else(|| {
            Arc::new(RateLimitTracker::new(config.rate_limit.buffer_percentage))
        });

        let connection = Connection::new(config, transport, credentials, rate_limits)?;
        Ok(TargetProcessClient::with_connection(Arc::new(connection)))
    }
}

impl Default for TargetProcessClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
