//! Configuration types for the TargetProcess client.

use crate::auth::Credentials;
use crate::errors::{TargetProcessError, TargetProcessResult};
use std::time::Duration;
use url::Url;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.targetprocess.com/api/v1/";

/// Path every self-hosted or on-demand account serves the API under.
pub const API_PATH: &str = "/api/v1/";

/// Default versioned JSON media type sent in `Accept`.
pub const DEFAULT_MEDIA_TYPE: &str = "application/vnd.targetprocess.v1+json; charset=utf-8";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "integrations-targetprocess/0.1.0";

const HOSTED_API_HOSTS: &[&str] = &["targetprocess.com", "api.targetprocess.com"];

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Share of the quota (0.0 to 1.0) below which callers should throttle.
    pub buffer_percentage: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            buffer_percentage: 0.1,
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum idle connections per host.
    pub max_idle_per_host: usize,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 20,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// TargetProcess client configuration.
#[derive(Debug, Clone)]
pub struct TargetProcessConfig {
    /// API base URL, always ending in `/`.
    pub base_url: String,
    /// Product identifier sent as User-Agent.
    pub user_agent: String,
    /// Default `Accept` value.
    pub media_type: String,
    /// Static credentials, if any.
    pub credentials: Option<Credentials>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Rate limit configuration.
    pub rate_limit: RateLimitConfig,
    /// Connection pool configuration.
    pub pool: PoolConfig,
}

impl Default for TargetProcessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rate_limit: RateLimitConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl TargetProcessConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TargetProcessConfigBuilder {
        TargetProcessConfigBuilder::new()
    }

    /// Parses the base URL.
    pub fn base_address(&self) -> TargetProcessResult<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            TargetProcessError::configuration(format!("Invalid base URL '{}': {}", self.base_url, e))
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> TargetProcessResult<()> {
        if self.base_url.is_empty() {
            return Err(TargetProcessError::configuration("Base URL cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(TargetProcessError::configuration(
                "Base URL must start with http:// or https://",
            ));
        }

        self.base_address()?;

        if self.user_agent.trim().is_empty() {
            return Err(TargetProcessError::configuration(
                "A product name is required for the User-Agent header",
            ));
        }

        if self.media_type.trim().is_empty() {
            return Err(TargetProcessError::configuration("Media type cannot be empty"));
        }

        if !(0.0..=1.0).contains(&self.rate_limit.buffer_percentage) {
            return Err(TargetProcessError::configuration(
                "Rate limit buffer must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

/// Normalizes a user-supplied address to the API root.
///
/// The hosted service maps to [`DEFAULT_BASE_URL`]; any other host is served
/// under [`API_PATH`].
pub fn fix_up_base_url(address: &str) -> TargetProcessResult<String> {
    let url = Url::parse(address).map_err(|e| {
        TargetProcessError::configuration(format!("Invalid base URL '{}': {}", address, e))
    })?;

    match url.host_str() {
        Some(host) if HOSTED_API_HOSTS.contains(&host) => Ok(DEFAULT_BASE_URL.to_string()),
        Some(_) => url
            .join(API_PATH)
            .map(|u| u.to_string())
            .map_err(|e| TargetProcessError::configuration(format!("Invalid base URL: {}", e))),
        None => Err(TargetProcessError::configuration(format!(
            "Base URL '{}' has no host",
            address
        ))),
    }
}

/// Builder for TargetProcessConfig.
#[derive(Debug, Default)]
pub struct TargetProcessConfigBuilder {
    base_url: Option<String>,
    user_agent: Option<String>,
    media_type: Option<String>,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    rate_limit: Option<RateLimitConfig>,
    pool: Option<PoolConfig>,
}

impl TargetProcessConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the account address; it is normalized to the API root on build.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the product identifier sent as User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the default `Accept` media type.
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Sets static credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the rate limit configuration.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Sets the connection pool configuration.
    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool = Some(config);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env(mut self) -> Self {
        if let Ok(url) = std::env::var("TARGETPROCESS_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Ok(ua) = std::env::var("TARGETPROCESS_USER_AGENT") {
            self.user_agent = Some(ua);
        }
        if let Ok(val) = std::env::var("TARGETPROCESS_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.timeout = Some(Duration::from_millis(ms));
            }
        }
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TargetProcessResult<TargetProcessConfig> {
        let base_url = match self.base_url {
            Some(url) => fix_up_base_url(&url)?,
            None => DEFAULT_BASE_URL.to_string(),
        };

        let config = TargetProcessConfig {
            base_url,
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            media_type: self.media_type.unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            credentials: self.credentials,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            rate_limit: self.rate_limit.unwrap_or_default(),
            pool: self.pool.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TargetProcessConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.media_type, DEFAULT_MEDIA_TYPE);
        assert!(config.credentials.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TargetProcessConfig::builder()
            .base_url("https://acme.tpondemand.com")
            .user_agent("sniper-tests/1.0")
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.base_url, "https://acme.tpondemand.com/api/v1/");
        assert_eq!(config.user_agent, "sniper-tests/1.0");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_fix_up_hosted_service() {
        assert_eq!(
            fix_up_base_url("https://targetprocess.com/").unwrap(),
            DEFAULT_BASE_URL
        );
        assert_eq!(
            fix_up_base_url("https://api.targetprocess.com/anything").unwrap(),
            DEFAULT_BASE_URL
        );
    }

    #[test]
    fn test_fix_up_is_idempotent() {
        let once = fix_up_base_url("http://localhost:8080/tp").unwrap();
        assert_eq!(once, "http://localhost:8080/api/v1/");
        assert_eq!(fix_up_base_url(&once).unwrap(), once);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = TargetProcessConfig::builder().base_url("invalid-url").build();
        assert!(matches!(result, Err(TargetProcessError::Configuration { .. })));
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let result = TargetProcessConfig::builder().user_agent("  ").build();
        assert!(result.is_err());
    }
}
