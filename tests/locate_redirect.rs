//! Tests for media URL resolution and error classification.

use playoutrs::{Error, MemoryTokenStore, PlayoutClient, TokenSet, TokenStore};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> PlayoutClient {
    let store = Arc::new(MemoryTokenStore::new(server.uri(), "playoutrs-test"));
    store.store_tokens(&TokenSet {
        access_token: "test-access-token".to_string(),
        refresh_token: "test-refresh-token".to_string(),
        media_token: "test-media-token".to_string(),
    });
    PlayoutClient::new(store)
}

#[tokio::test]
async fn test_locate_returns_redirect_location() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/tracks/test-track-uuid/location"))
        .and(header("authorization", "Bearer test-media-token"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "https://bucket.example.com/media/track.flac?signature=abc123",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let url = client
        .locate("/api/tracks/test-track-uuid/location")
        .await
        .unwrap();
    assert!(url.as_str().starts_with("https://"));
    assert_eq!(url.path(), "/media/track.flac");
}

#[tokio::test]
async fn test_locate_without_location_header() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/tracks/test-track-uuid/location"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client
        .locate("/api/tracks/test-track-uuid/location")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoRedirection));
}

#[tokio::test]
async fn test_forbidden_is_classified() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client.home().await.unwrap_err();
    assert!(matches!(err, Error::Forbidden));
}

#[tokio::test]
async fn test_other_client_errors_are_classified() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.home().await.unwrap_err();
    match err {
        Error::ClientError(status) => assert_eq!(status.as_u16(), 404),
        other => panic!("expected ClientError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_errors_are_classified() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/home"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.home().await.unwrap_err();
    match err {
        Error::ServerError(status) => assert_eq!(status.as_u16(), 503),
        other => panic!("expected ServerError, got {other:?}"),
    }
}
