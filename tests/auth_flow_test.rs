//! Integration tests for the device flow and token refresh against a mock
//! GitHub server.

mod common;

use chrono::Utc;
use git_autocommit::auth::{
    AuthInstructions, AuthManager, Credential, CredentialStore, DeviceFlowDisplay,
    GitHubIdentityProvider, IdentityProvider, PollOutcome,
};
use git_autocommit::config::Endpoints;
use git_autocommit::error::AuthError;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingDisplay {
    codes: Vec<String>,
}

impl DeviceFlowDisplay for RecordingDisplay {
    fn show_instructions(&mut self, instructions: &AuthInstructions) {
        self.codes.push(instructions.user_code.clone());
    }
}

fn provider(server: &MockServer) -> GitHubIdentityProvider {
    GitHubIdentityProvider::new(common::http_client(), Endpoints::single_host(&server.uri()))
}

fn cached(store: &CredentialStore) -> Option<Credential> {
    let lock = store.lock().unwrap();
    store.load(&lock).unwrap()
}

async fn mount_device_code(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login/device/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-123",
            "user_code": "ABCD-1234",
            "verification_uri": "https://github.com/login/device",
            "expires_in": 900,
            "interval": 0
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_device_flow_caches_exchanged_credential() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "authorization_pending",
            "error_description": "The user has not yet entered the code"
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_device_token",
            "token_type": "bearer",
            "scope": "read:user"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let expires_at = Utc::now().timestamp() + 1800;
    Mock::given(method("GET"))
        .and(path("/copilot_internal/v2/token"))
        .and(header("authorization", "token gho_device_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tid=copilot;exp=1",
            "expires_at": expires_at,
            "refresh_in": 1500
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    let manager = AuthManager::new(provider(&server), store.clone());
    let mut display = RecordingDisplay::default();

    let credential = manager
        .authenticate(&mut display, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(display.codes, vec!["ABCD-1234"]);
    assert_eq!(credential.access_token, "tid=copilot;exp=1");
    assert_eq!(credential.refresh_token.as_deref(), Some("gho_device_token"));
    assert_eq!(credential.expires_at.unwrap().timestamp(), expires_at);
    assert_eq!(cached(&store), Some(credential));
}

#[tokio::test]
async fn test_denied_device_flow_writes_nothing() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "access_denied",
            "error_description": "The user has denied your application access."
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    let manager = AuthManager::new(provider(&server), store.clone());

    let result = manager
        .authenticate(&mut RecordingDisplay::default(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AuthError::AuthDenied)));
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_cancelled_device_flow_writes_nothing() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    let manager = AuthManager::new(provider(&server), store.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = manager
        .authenticate(&mut RecordingDisplay::default(), &cancel)
        .await;

    assert!(matches!(result, Err(AuthError::Cancelled)));
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_poll_token_maps_slow_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "slow_down",
            "interval": 10
        })))
        .mount(&server)
        .await;

    let outcome = provider(&server).poll_token("dev-123").await.unwrap();
    assert_eq!(outcome, PollOutcome::SlowDown { interval: Some(10) });
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_through_exchange() {
    let server = MockServer::start().await;
    let expires_at = Utc::now().timestamp() + 1800;
    Mock::given(method("GET"))
        .and(path("/copilot_internal/v2/token"))
        .and(header("authorization", "token gho_refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tid=fresh",
            "expires_at": expires_at
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    {
        let mut stale = common::live_credential("tid=stale");
        stale.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
        let lock = store.lock().unwrap();
        store.save(&lock, &stale).unwrap();
    }

    let manager = AuthManager::new(provider(&server), store.clone());
    let credential = manager.get_valid_token().await.unwrap();

    assert_eq!(credential.access_token, "tid=fresh");
    assert_eq!(cached(&store).unwrap().access_token, "tid=fresh");
}

#[tokio::test]
async fn test_revoked_refresh_token_clears_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/copilot_internal/v2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    {
        let mut stale = common::live_credential("tid=stale");
        stale.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
        let lock = store.lock().unwrap();
        store.save(&lock, &stale).unwrap();
    }

    let manager = AuthManager::new(provider(&server), store.clone());
    let result = manager.get_valid_token().await;

    assert!(matches!(result, Err(AuthError::AuthExpired)));
    assert_eq!(cached(&store), None);
}

#[tokio::test]
async fn test_not_authenticated_without_cache() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = AuthManager::new(
        provider(&server),
        CredentialStore::new(dir.path().join("credentials.json")),
    );

    assert!(matches!(
        manager.get_valid_token().await,
        Err(AuthError::NotAuthenticated)
    ));
}
