//! Credential resolution through the connection.

use async_trait::async_trait;
use integrations_targetprocess::mocks::{MockResponse, MockTransport};
use integrations_targetprocess::{CredentialProvider, Credentials, TargetProcessClient};
use mockall::mock;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CONTEXT: &str = "https://tp.example.com/api/v1/Context";

mock! {
    pub Provider {}

    #[async_trait]
    impl CredentialProvider for Provider {
        async fn resolve(&self) -> Option<Credentials>;
    }
}

fn client(transport: &MockTransport, provider: MockProvider) -> TargetProcessClient {
    TargetProcessClient::builder()
        .base_url("https://tp.example.com")
        .transport(Arc::new(transport.clone()))
        .credential_provider(Arc::new(provider))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_credentials_resolved_for_every_call() {
    let transport = MockTransport::new();
    transport.on_get(CONTEXT, MockResponse::ok(&json!({})));
    transport.on_get(CONTEXT, MockResponse::ok(&json!({})));

    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();

    let mut provider = MockProvider::new();
    provider.expect_resolve().times(2).returning(move || {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        Some(Credentials::token(format!("token-{}", n)))
    });

    let client = client(&transport, provider);
    client.get_raw("Context").await.unwrap();
    client.get_raw("Context").await.unwrap();

    let headers: Vec<_> = transport
        .requests()
        .iter()
        .map(|r| r.header("authorization").map(String::from))
        .collect();
    assert_eq!(
        headers,
        vec![Some("Bearer token-0".to_string()), Some("Bearer token-1".to_string())]
    );
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_anonymous_sends_no_authorization() {
    let transport = MockTransport::new();
    transport.on_get(CONTEXT, MockResponse::ok(&json!({})));

    let mut provider = MockProvider::new();
    provider.expect_resolve().times(1).returning(|| None);

    let client = client(&transport, provider);
    client.get_raw("Context").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].header("authorization"), None);
}

#[tokio::test]
async fn test_app_credentials_use_basic_scheme() {
    let transport = MockTransport::new();
    transport.on_get(CONTEXT, MockResponse::ok(&json!({})));

    let mut provider = MockProvider::new();
    provider
        .expect_resolve()
        .times(1)
        .returning(|| Some(Credentials::app("client", "s3cret")));

    let client = client(&transport, provider);
    client.get_raw("Context").await.unwrap();

    // "client:s3cret" in base64
    assert_eq!(
        transport.requests()[0].header("authorization"),
        Some("Basic Y2xpZW50OnMzY3JldA==")
    );
}

#[tokio::test]
async fn test_explicit_authorization_header_wins() {
    let transport = MockTransport::new();
    transport.on_get(CONTEXT, MockResponse::ok(&json!({})));

    let mut provider = MockProvider::new();
    provider.expect_resolve().never();

    let client = client(&transport, provider);
    let request = integrations_targetprocess::RequestBuilder::get("Context")
        .header("Authorization", "Bearer override");
    client
        .execute::<serde_json::Value>(
            request,
            integrations_targetprocess::Expect::Single,
            &Default::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        transport.requests()[0].header("authorization"),
        Some("Bearer override")
    );
}
