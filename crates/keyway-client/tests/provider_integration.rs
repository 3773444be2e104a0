//! Integration tests against a mocked identity provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{EncodingKey, Header};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keyway_client::prelude::*;
use keyway_client::store::MemoryCredentialStore;
use keyway_client::{
    DiscoveryClient, HttpGateway, TokenLedger,
};

const HS256_SECRET: &[u8] = b"integration-test-signing-secret!";

fn discovery_doc(server: &MockServer) -> serde_json::Value {
    serde_json::json!({
        "issuer": server.uri(),
        "authorization_endpoint": format!("{}/authorize", server.uri()),
        "token_endpoint": format!("{}/token", server.uri()),
        "jwks_uri": format!("{}/jwks", server.uri()),
        "userinfo_endpoint": format!("{}/userinfo", server.uri()),
        "end_session_endpoint": format!("{}/logout", server.uri()),
        "response_types_supported": ["code"],
        "response_modes_supported": ["query", "web_message"],
        "id_token_signing_alg_values_supported": ["RS256", "HS256"],
        "code_challenge_methods_supported": ["S256"]
    })
}

fn jwks_doc() -> serde_json::Value {
    serde_json::json!({
        "keys": [{
            "kty": "oct",
            "kid": "k1",
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(HS256_SECRET)
        }]
    })
}

async fn mount_provider(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_doc(server)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_doc()))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        Url::parse(&server.uri()).unwrap(),
        "client-1",
        Url::parse("https://app.example.com/callback").unwrap(),
    )
    .with_allow_http(true)
}

fn signed_id_token(issuer: &str, nonce: &str) -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let claims = serde_json::json!({
        "iss": issuer,
        "sub": "alice",
        "aud": "client-1",
        "exp": now + 300,
        "iat": now,
        "nonce": nonce,
    });

    let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some("k1".to_string());
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(HS256_SECRET)).unwrap()
}

fn query_map(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[tokio::test]
async fn authorization_code_flow_end_to_end() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    let store = Arc::new(MemoryCredentialStore::new());
    let session = AuthSession::new(config_for(&server), store).unwrap();

    let request = session
        .begin_authorization(&AuthorizeOptions {
            scopes: vec!["profile".to_string()],
            offline_access: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let params = query_map(&request.url);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["scope"], "profile openid offline_access");
    let nonce = params["nonce"].clone();

    let id_token = signed_id_token(&server.uri(), &nonce);
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt-1",
            "id_token": id_token,
            "scope": "profile openid offline_access"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let callback = Url::parse(&format!(
        "https://app.example.com/callback?code=abc&state={}",
        request.state
    ))
    .unwrap();
    let claims = session.handle_callback(&callback).await.unwrap();
    assert_eq!(claims.sub, "alice");

    let token = session
        .get_access_token(&["profile"], None, None)
        .await
        .unwrap();
    assert_eq!(token, "at-1");

    let identity = session.identity_token().await.unwrap().unwrap();
    assert_eq!(identity.claims["sub"], "alice");

    // Flow state is one-shot
    let err = session.handle_callback(&callback).await.unwrap_err();
    assert!(matches!(err, AuthError::NoPendingAuthorization));
}

#[tokio::test]
async fn callback_with_wrong_state_is_rejected() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    let session =
        AuthSession::new(config_for(&server), Arc::new(MemoryCredentialStore::new())).unwrap();
    session
        .begin_authorization(&AuthorizeOptions::default())
        .await
        .unwrap();

    let callback =
        Url::parse("https://app.example.com/callback?code=abc&state=forged").unwrap();
    let err = session.handle_callback(&callback).await.unwrap_err();
    assert!(matches!(err, AuthError::StateMismatch));
}

#[tokio::test]
async fn provider_error_callback_surfaces_as_provider_error() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    let session =
        AuthSession::new(config_for(&server), Arc::new(MemoryCredentialStore::new())).unwrap();
    let request = session
        .begin_authorization(&AuthorizeOptions::default())
        .await
        .unwrap();

    let callback = Url::parse(&format!(
        "https://app.example.com/callback?error=access_denied&error_description=declined&state={}",
        request.state
    ))
    .unwrap();
    match session.handle_callback(&callback).await.unwrap_err() {
        AuthError::Provider { error, .. } => assert_eq!(error, "access_denied"),
        other => panic!("Expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_record_is_refreshed_through_the_token_endpoint() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-new",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt-new"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Arc::new(config_for(&server));
    let discovery = Arc::new(DiscoveryClient::new(
        config.issuer.clone(),
        config.request_timeout,
        true,
    ));
    let gateway = Arc::new(HttpGateway::new(Arc::clone(&config), discovery));
    let store = Arc::new(MemoryCredentialStore::new());
    let ledger = TokenLedger::new(store, gateway, Duration::from_secs(15));

    // Seed an already-expired record that still holds a refresh token
    let response = keyway_client::TokenResponse {
        access_token: "at-old".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: Some(0),
        refresh_token: Some("rt-old".to_string()),
        id_token: None,
        scope: Some("openid profile".to_string()),
    };
    ledger
        .store_token_response(&response, &[], None, None, None)
        .await
        .unwrap();

    let token = ledger
        .select_access_token(&["profile"], None, None)
        .await
        .unwrap();
    assert_eq!(token, "at-new");

    // The replacement record preserved scope and adopted the new refresh token
    let records = ledger.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].scope.contains("profile"));
    assert_eq!(records[0].refresh_token.as_deref(), Some("rt-new"));
}

#[tokio::test]
async fn challenge_cycle_over_http() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transactionId": "txn-9",
            "method": "OTP",
            "pollForCompletion": false,
            "payload": {"kind": "none"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions/txn-9"))
        .and(body_string_contains("123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "completed": true,
            "tokens": {
                "access_token": "rba-at",
                "token_type": "Bearer",
                "expires_in": 300
            }
        })))
        .mount(&server)
        .await;

    let mut session =
        AuthSession::new(config_for(&server), Arc::new(MemoryCredentialStore::new())).unwrap();

    let challenge = session
        .request_challenge(&ChallengeParameters {
            method: Some(AuthMethod::Otp),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(challenge.transaction_id, "txn-9");
    assert_eq!(challenge.method, AuthMethod::Otp);

    let outcome = session
        .submit_challenge(&ChallengeSubmission::Response {
            response: "123456".to_string(),
        })
        .await
        .unwrap();
    assert!(outcome.is_completed());

    // The scope-less completion response still yields an openid record
    let token = session
        .get_access_token(&["openid"], None, None)
        .await
        .unwrap();
    assert_eq!(token, "rba-at");
}

#[tokio::test]
async fn dropped_transaction_reports_expiry() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transactionId": "txn-gone",
            "method": "TOKENPUSH",
            "pollForCompletion": true,
            "payload": {"kind": "none"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/transactions/txn-gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut session =
        AuthSession::new(config_for(&server), Arc::new(MemoryCredentialStore::new())).unwrap();
    session
        .request_challenge(&ChallengeParameters::default())
        .await
        .unwrap();

    let err = session.poll_for_completion().await.unwrap_err();
    assert!(matches!(err, AuthError::TransactionExpired { .. }));
}

#[tokio::test]
async fn userinfo_json_and_jwt() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"sub": "alice", "email": "a@b.c"})),
        )
        .mount(&server)
        .await;

    let session =
        AuthSession::new(config_for(&server), Arc::new(MemoryCredentialStore::new())).unwrap();
    let claims = session.fetch_userinfo("at-1").await.unwrap();
    assert_eq!(claims["email"], "a@b.c");

    // Signed userinfo goes through key-set validation
    let server = MockServer::start().await;
    mount_provider(&server).await;

    let jwt = signed_id_token(&server.uri(), "unused");
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(jwt, "application/jwt"),
        )
        .mount(&server)
        .await;

    let session =
        AuthSession::new(config_for(&server), Arc::new(MemoryCredentialStore::new())).unwrap();
    let claims = session.fetch_userinfo("at-1").await.unwrap();
    assert_eq!(claims["sub"], "alice");
}

/// Navigator double that records where it was sent.
#[derive(Default)]
struct RecordingNavigator {
    visited: std::sync::Mutex<Vec<Url>>,
}

#[async_trait::async_trait]
impl keyway_client::Navigator for RecordingNavigator {
    async fn replace_url(&self, _url: &Url) -> keyway_client::AuthResult<()> {
        Ok(())
    }

    async fn navigate(&self, url: &Url) -> keyway_client::AuthResult<()> {
        self.visited.lock().unwrap().push(url.clone());
        Ok(())
    }
}

#[tokio::test]
async fn logout_visits_the_end_session_url() {
    let server = MockServer::start().await;
    mount_provider(&server).await;

    let navigator = Arc::new(RecordingNavigator::default());
    let store = Arc::new(MemoryCredentialStore::new());
    let mut session = AuthSession::new(
        config_for(&server)
            .with_post_logout_redirect_uri(Url::parse("https://app.example.com/").unwrap()),
        store,
    )
    .unwrap()
    .with_navigator(navigator.clone());

    // Without a session, logout is a local no-op
    assert!(session.logout().await.unwrap().is_none());

    session
        .ledger()
        .store_identity_token(&keyway_client::IdentityTokenRecord {
            encoded: "header.payload.sig".to_string(),
            claims: serde_json::json!({"sub": "alice"}),
        })
        .await
        .unwrap();

    let url = session.logout().await.unwrap().unwrap();
    assert!(url.as_str().starts_with(&format!("{}/logout", server.uri())));
    let params = query_map(&url);
    assert_eq!(params["client_id"], "client-1");
    assert_eq!(params["id_token_hint"], "header.payload.sig");
    assert_eq!(params["post_logout_redirect_uri"], "https://app.example.com/");

    // The attached navigator was sent to the same URL
    assert_eq!(navigator.visited.lock().unwrap().as_slice(), &[url]);

    assert!(session.identity_token().await.unwrap().is_none());
}
