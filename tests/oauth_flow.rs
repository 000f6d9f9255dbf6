use feedcaster::auth::{AuthState, Consumer, Credential, Endpoints, Handshake, OAuthClient};
use feedcaster::publish::{ApiPublisher, Publisher};
use feedcaster::rss::FeedItem;
use feedcaster::store::CredentialStore;
use feedcaster::RelayError;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OAuthClient {
    OAuthClient::new(
        Consumer::new("consumer-key", "consumer-secret"),
        Endpoints::from_base(&server.uri()).unwrap(),
    )
    .unwrap()
}

fn access_credential() -> Credential {
    Credential {
        token: "access-token".to_string(),
        token_secret: "access-secret".to_string(),
        account_handle: "debian".to_string(),
        user_id: Some("42".to_string()),
    }
}

/// Start-to-finish handshake that stores the credential only on success.
async fn authorize(
    client: &OAuthClient,
    store: &CredentialStore,
    verifier: &str,
) -> Result<Credential, RelayError> {
    let mut handshake = Handshake::new(client);
    handshake.start().await?;
    let credential = handshake.complete(verifier).await?;
    store.save(&credential)?;
    Ok(credential)
}

#[tokio::test]
async fn handshake_stores_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .and(query_param("x_auth_access_type", "write"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=request-token&oauth_token_secret=request-secret&oauth_callback_confirmed=true",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(query_param("oauth_verifier", "1234567"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=access-token&oauth_token_secret=access-secret&user_id=42&screen_name=debian",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut handshake = Handshake::new(&client);

    let url = handshake.start().await.unwrap();
    assert_eq!(
        url.as_str(),
        format!("{}/oauth/authorize?oauth_token=request-token", server.uri())
    );
    assert!(matches!(handshake.state(), AuthState::RequestTokenObtained(_)));

    let credential = handshake.complete(" 1234567\n").await.unwrap();
    assert_eq!(credential, access_credential());
    assert_eq!(handshake.state(), &AuthState::Authorized(credential.clone()));

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("token_store.json"));
    store.save(&credential).unwrap();
    assert_eq!(store.load(), Some(credential));
}

#[tokio::test]
async fn request_token_without_token_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("oauth_callback_confirmed=true"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("token_store.json"));

    let result = authorize(&client(&server), &store, "1234567").await;
    assert!(matches!(result, Err(RelayError::Protocol(_))));
    assert!(!store.path().exists());
    assert!(store.load().is_none());
}

#[tokio::test]
async fn rejected_verifier_keeps_request_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=request-token&oauth_token_secret=request-secret",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid verifier"))
        .mount(&server)
        .await;

    let client = client(&server);
    let mut handshake = Handshake::new(&client);
    handshake.start().await.unwrap();

    let err = handshake.complete("0000000").await.unwrap_err();
    assert!(matches!(err, RelayError::Transport { status: Some(401), .. }));
    assert!(matches!(handshake.state(), AuthState::RequestTokenObtained(_)));
}

#[tokio::test]
async fn publish_returns_post_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(header_exists("authorization"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({
            "text": "Debian 13 released #release\nhttps://www.debian.org/News/2025/trixie"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "id": "1445880548472328192",
                "text": "Debian 13 released #release https://t.co/abc"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = ApiPublisher::new(client(&server));
    let item = FeedItem::new("Debian 13 released", "https://www.debian.org/News/2025/trixie")
        .with_categories(["release"]);

    let result = publisher.publish(&item, &access_credential()).await.unwrap();
    assert_eq!(result.post_id, "1445880548472328192");
    assert_eq!(
        result.post_url,
        "https://twitter.com/debian/status/1445880548472328192"
    );
}

#[tokio::test]
async fn publish_rejection_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "detail": "You are not allowed to create a Tweet with duplicate content."
        })))
        .mount(&server)
        .await;

    let publisher = ApiPublisher::new(client(&server));
    let item = FeedItem::new("Title", "https://example.org/1");
    let err = publisher.publish(&item, &access_credential()).await.unwrap_err();
    assert!(matches!(err, RelayError::Transport { status: Some(403), .. }));
}

#[tokio::test]
async fn publish_response_without_id_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": [] })))
        .mount(&server)
        .await;

    let publisher = ApiPublisher::new(client(&server));
    let item = FeedItem::new("Title", "https://example.org/1");
    let err = publisher.publish(&item, &access_credential()).await.unwrap_err();
    assert!(matches!(err, RelayError::Protocol(_)));
}
