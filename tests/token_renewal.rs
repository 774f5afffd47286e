//! Tests for transparent access-token renewal.
//!
//! An access-mode call that comes back 401 must refresh through `/api/token`
//! with the refresh token, update the store once, and retry the original
//! request exactly once.

use playoutrs::{Error, MemoryTokenStore, PlayoutClient, TokenSet, TokenStore};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn expired_client(server: &MockServer) -> (Arc<MemoryTokenStore>, PlayoutClient) {
    let store = Arc::new(MemoryTokenStore::new(server.uri(), "playoutrs-test"));
    store.store_tokens(&TokenSet {
        access_token: "test-expired-token".to_string(),
        refresh_token: "test-refresh-token".to_string(),
        media_token: "test-media-token".to_string(),
    });
    let client = PlayoutClient::new(store.clone());
    (store, client)
}

fn token_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "AccessToken": "new-access-token",
        "RefreshToken": "test-refresh-token",
        "MediaToken": "test-media-token",
    }))
}

#[tokio::test]
async fn test_transparent_renewal() {
    let server = MockServer::start().await;
    let (store, client) = expired_client(&server);

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .and(header("authorization", "Bearer test-expired-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/token"))
        .and(header("authorization", "Bearer test-refresh-token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .and(header("authorization", "Bearer new-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.home().await.unwrap();

    let access = store.access_token().unwrap();
    assert_ne!(access, "test-expired-token");
    assert_eq!(access, "new-access-token");
}

#[tokio::test]
async fn test_renewal_retries_exactly_once() {
    let server = MockServer::start().await;
    let (_store, client) = expired_client(&server);

    // Still unauthorized after the refresh: the retry must not loop
    Mock::given(method("GET"))
        .and(path("/api/home"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;

    let err = client.home().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
}

#[tokio::test]
async fn test_failed_refresh_surfaces_original_unauthorized() {
    let server = MockServer::start().await;
    let (store, client) = expired_client(&server);

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.home().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized), "got {err:?}");
    assert_eq!(store.access_token().as_deref(), Some("test-expired-token"));
}

#[tokio::test]
async fn test_non_access_modes_do_not_renew() {
    let server = MockServer::start().await;
    let (_store, client) = expired_client(&server);

    Mock::given(method("GET"))
        .and(path("/api/tracks/1/location"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/token"))
        .respond_with(token_response())
        .expect(0)
        .mount(&server)
        .await;

    let err = client.locate("/api/tracks/1/location").await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
}

#[tokio::test]
async fn test_concurrent_renewals_coalesce() {
    let server = MockServer::start().await;
    let (store, client) = expired_client(&server);
    let client = Arc::new(client);

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .and(header("authorization", "Bearer test-expired-token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    // At most one refresh regardless of how many calls saw the stale token
    Mock::given(method("GET"))
        .and(path("/api/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .and(header("authorization", "Bearer new-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let calls = (0..4).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.home().await })
    });
    for call in calls {
        call.await.unwrap().unwrap();
    }

    assert_eq!(store.access_token().as_deref(), Some("new-access-token"));
}
