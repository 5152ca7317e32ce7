//! Credentials and the providers that supply them.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::OnceCell;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Default prefix for credential environment variables.
pub const DEFAULT_ENV_PREFIX: &str = "TARGETPROCESS";

/// Authentication scheme of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationType {
    /// No authentication.
    Anonymous,
    /// Username and password.
    Basic,
    /// Opaque bearer token.
    Token,
    /// Application client id and secret.
    App,
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Basic => write!(f, "basic"),
            Self::Token => write!(f, "token"),
            Self::App => write!(f, "app"),
        }
    }
}

/// Credential material for one scheme.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Send requests unauthenticated.
    Anonymous,
    /// Basic authentication.
    Basic {
        /// Login name.
        login: String,
        /// Password.
        password: SecretString,
    },
    /// Bearer token.
    Token(SecretString),
    /// Application credentials, sent as basic authentication.
    App {
        /// Client id.
        client_id: String,
        /// Client secret.
        client_secret: SecretString,
    },
}

impl Credentials {
    /// Creates basic credentials.
    pub fn basic(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            login: login.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// Creates token credentials.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(SecretString::new(token.into()))
    }

    /// Creates application credentials.
    pub fn app(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::App {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
        }
    }

    /// Gets the authentication scheme.
    pub fn authentication_type(&self) -> AuthenticationType {
        match self {
            Self::Anonymous => AuthenticationType::Anonymous,
            Self::Basic { .. } => AuthenticationType::Basic,
            Self::Token(_) => AuthenticationType::Token,
            Self::App { .. } => AuthenticationType::App,
        }
    }

    /// Generates the Authorization header value, if the scheme sends one.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { login, password } => Some(basic_header(login, password)),
            Self::Token(token) => Some(format!("Bearer {}", token.expose_secret())),
            Self::App {
                client_id,
                client_secret,
            } => Some(basic_header(client_id, client_secret)),
        }
    }
}

fn basic_header(user: &str, secret: &SecretString) -> String {
    let raw = format!("{}:{}", user, secret.expose_secret());
    format!("Basic {}", STANDARD.encode(raw))
}

/// Supplies credentials to the connection.
///
/// `None` means no credential material is configured; the request is then
/// sent unauthenticated.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Gets the credentials for the next request.
    async fn resolve(&self) -> Option<Credentials>;
}

/// Provider holding fixed credentials.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    credentials: Option<Credentials>,
}

impl InMemoryCredentialStore {
    /// Creates a store for the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    /// Creates a store with no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for InMemoryCredentialStore {
    async fn resolve(&self) -> Option<Credentials> {
        self.credentials.clone()
    }
}

/// Provider that reads its backing source once and caches the result.
///
/// Concurrent first calls run the loader exactly once.
pub struct LazyCredentialProvider<F> {
    loader: F,
    cached: OnceCell<Option<Credentials>>,
}

impl<F> LazyCredentialProvider<F>
where
    F: Fn() -> Option<Credentials> + Send + Sync,
{
    /// Creates a provider around a loader.
    pub fn new(loader: F) -> Self {
        Self {
            loader,
            cached: OnceCell::new(),
        }
    }

    /// Returns true once the loader has run.
    pub fn is_loaded(&self) -> bool {
        self.cached.get().is_some()
    }

    fn load(&self) -> Option<Credentials> {
        self.cached.get_or_init(|| (self.loader)()).clone()
    }
}

#[async_trait]
impl<F> CredentialProvider for LazyCredentialProvider<F>
where
    F: Fn() -> Option<Credentials> + Send + Sync,
{
    async fn resolve(&self) -> Option<Credentials> {
        self.load()
    }
}

type EnvLoader = Box<dyn Fn() -> Option<Credentials> + Send + Sync>;

/// Environment variable credential provider.
///
/// Reads `<PREFIX>_TOKEN`, then `<PREFIX>_USERNAME` with `<PREFIX>_PASSWORD`,
/// then `<PREFIX>_CLIENT_ID` with `<PREFIX>_CLIENT_SECRET`, on first use only.
pub struct EnvCredentialProvider {
    inner: LazyCredentialProvider<EnvLoader>,
}

impl EnvCredentialProvider {
    /// Creates a provider using the `TARGETPROCESS_` variables.
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Creates a provider using a custom variable prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let loader: EnvLoader =
            Box::new(move || credentials_from_vars(&prefix, |name| std::env::var(name).ok()));
        Self {
            inner: LazyCredentialProvider::new(loader),
        }
    }

    /// Returns true once the environment has been read.
    pub fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self) -> Option<Credentials> {
        self.inner.load()
    }
}

/// Picks credentials from prefixed variables. Blank values count as unset.
pub fn credentials_from_vars<L>(prefix: &str, lookup: L) -> Option<Credentials>
where
    L: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.trim().is_empty())
    };

    if let Some(token) = var("TOKEN") {
        return Some(Credentials::token(token));
    }
    if let (Some(login), Some(password)) = (var("USERNAME"), var("PASSWORD")) {
        return Some(Credentials::basic(login, password));
    }
    if let (Some(id), Some(secret)) = (var("CLIENT_ID"), var("CLIENT_SECRET")) {
        return Some(Credentials::app(id, secret));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_token_header() {
        let credentials = Credentials::token("tp_secret");
        assert_eq!(credentials.authentication_type(), AuthenticationType::Token);
        assert_eq!(
            credentials.authorization_header().as_deref(),
            Some("Bearer tp_secret")
        );
    }

    #[test]
    fn test_basic_header() {
        let credentials = Credentials::basic("admin", "admin");
        assert_eq!(
            credentials.authorization_header().as_deref(),
            Some("Basic YWRtaW46YWRtaW4=")
        );
    }

    #[test]
    fn test_app_header_uses_basic_scheme() {
        let credentials = Credentials::app("client", "secret");
        assert_eq!(credentials.authentication_type(), AuthenticationType::App);
        assert_eq!(
            credentials.authorization_header().as_deref(),
            Some("Basic Y2xpZW50OnNlY3JldA==")
        );
    }

    #[test]
    fn test_anonymous_sends_no_header() {
        assert!(Credentials::Anonymous.authorization_header().is_none());
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let debug = format!("{:?}", Credentials::basic("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryCredentialStore::new(Credentials::token("abc"));
        assert!(matches!(store.resolve().await, Some(Credentials::Token(_))));

        assert!(InMemoryCredentialStore::anonymous().resolve().await.is_none());
    }

    #[tokio::test]
    async fn test_lazy_provider_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let provider = LazyCredentialProvider::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Credentials::token("abc"))
        });

        assert!(!provider.is_loaded());
        for _ in 0..3 {
            assert!(provider.resolve().await.is_some());
        }
        assert!(provider.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lazy_provider_caches_absence() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let provider = LazyCredentialProvider::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });

        assert!(provider.resolve().await.is_none());
        assert!(provider.resolve().await.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lazy_provider_concurrent_first_access() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let provider = Arc::new(LazyCredentialProvider::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Some(Credentials::basic("user", "pass"))
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.resolve().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_credentials_from_vars_precedence() {
        let vars: HashMap<&str, &str> = [
            ("TP_TOKEN", "tok"),
            ("TP_USERNAME", "user"),
            ("TP_PASSWORD", "pass"),
        ]
        .into_iter()
        .collect();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        let credentials = credentials_from_vars("TP", lookup).unwrap();
        assert_eq!(credentials.authentication_type(), AuthenticationType::Token);
    }

    #[test]
    fn test_credentials_from_vars_fallbacks() {
        let basic: HashMap<&str, &str> = [("TP_USERNAME", "user"), ("TP_PASSWORD", "pass"), ("TP_TOKEN", " ")]
            .into_iter()
            .collect();
        let credentials =
            credentials_from_vars("TP", |name| basic.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(credentials.authentication_type(), AuthenticationType::Basic);

        let app: HashMap<&str, &str> = [("TP_CLIENT_ID", "id"), ("TP_CLIENT_SECRET", "secret")]
            .into_iter()
            .collect();
        let credentials =
            credentials_from_vars("TP", |name| app.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(credentials.authentication_type(), AuthenticationType::App);

        let partial: HashMap<&str, &str> = [("TP_USERNAME", "user")].into_iter().collect();
        assert!(credentials_from_vars("TP", |name| partial.get(name).map(|v| v.to_string())).is_none());
    }
}
