use std::net::TcpListener;
use std::sync::Arc;

use identity_service::configuration::JwtSettings;
use identity_service::startup::run;
use identity_service::store::InMemoryStore;
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
}

fn test_jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-test-secret-key-32-characters-min".to_string(),
        issuer: "identity-service".to_string(),
        audience: "identity-service-clients".to_string(),
        access_token_expiry: 10800,
        refresh_token_expiry: 604800,
    }
}

fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let store = Arc::new(InMemoryStore::new());
    let server = run(listener, store, test_jwt_settings()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp { address }
}

async fn register_alice(app: &TestApp, client: &reqwest::Client) {
    let body = json!({
        "username": "alice",
        "email": "alice@example.com",
        "password": "SecurePass123",
        "first_name": "Alice",
        "last_name": "Archer"
    });

    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
}

async fn login_alice(app: &TestApp, client: &reqwest::Client) -> Value {
    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"username": "alice", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    response.json().await.expect("Failed to parse response")
}

// --- Registration ---

#[tokio::test]
async fn register_returns_200_for_valid_input() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    register_alice(&app, &client).await;
}

#[tokio::test]
async fn register_returns_409_for_duplicate_username() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    let body = json!({
        "username": "bob",
        "email": "bob@example.com",
        "password": "SecurePass123"
    });

    let first = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, first.status().as_u16());

    let second = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(409, second.status().as_u16());

    let body: Value = second.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "User already exists");
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    let test_cases = vec![
        (
            json!({"username": "x", "email": "x@example.com", "password": "SecurePass123"}),
            "username too short",
        ),
        (
            json!({"username": "carol", "email": "notanemail", "password": "SecurePass123"}),
            "invalid email",
        ),
        (
            json!({"username": "carol", "email": "carol@example.com", "password": "weak"}),
            "weak password",
        ),
        (json!({}), "missing fields"),
    ];

    for (body, reason) in test_cases {
        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject request: {}",
            reason
        );
    }
}

// --- Login ---

#[tokio::test]
async fn login_returns_tokens_for_valid_credentials() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let body = login_alice(&app, &client).await;
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert!(!body["refresh_token"].as_str().unwrap().is_empty());
    assert_eq!(body["message"], "Login successful");
}

#[tokio::test]
async fn login_returns_401_for_bad_credentials() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let attempts = vec![
        json!({"username": "alice", "password": "WrongPass123"}),
        json!({"username": "nobody", "password": "SecurePass123"}),
    ];

    for attempt in attempts {
        let response = client
            .post(&format!("{}/auth/login", &app.address))
            .json(&attempt)
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(401, response.status().as_u16());

        // Unknown user and wrong password are indistinguishable.
        let body: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(body["message"], "Invalid username or password");
    }
}

// --- Refresh ---

#[tokio::test]
async fn refresh_rotates_the_token() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let login = login_alice(&app, &client).await;
    let old_refresh = login["refresh_token"].as_str().unwrap();

    let response = client
        .post(&format!("{}/auth/refresh-token", &app.address))
        .json(&json!({"token": old_refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Token refreshed");
    assert_ne!(
        body["refresh_token"].as_str().unwrap(),
        old_refresh,
        "Refresh token should be rotated on each refresh"
    );
    assert!(!body["token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn replayed_refresh_token_is_rejected() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let login = login_alice(&app, &client).await;
    let old_refresh = login["refresh_token"].as_str().unwrap();

    let first = client
        .post(&format!("{}/auth/refresh-token", &app.address))
        .json(&json!({"token": old_refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, first.status().as_u16());
    let rotated: Value = first.json().await.expect("Failed to parse response");

    // Presenting the consumed token again must fail...
    let replay = client
        .post(&format!("{}/auth/refresh-token", &app.address))
        .json(&json!({"token": old_refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, replay.status().as_u16());
    let body: Value = replay.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Token expired or revoked");

    // ...and revokes the downstream chain, so the successor dies with it.
    let successor = rotated["refresh_token"].as_str().unwrap();
    let after = client
        .post(&format!("{}/auth/refresh-token", &app.address))
        .json(&json!({"token": successor}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, after.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_for_unknown_token() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/refresh-token", &app.address))
        .json(&json!({"token": "definitely-not-a-token"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Invalid token");
}

// --- Revoke ---

#[tokio::test]
async fn revoke_then_second_revoke_is_a_client_error() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let login = login_alice(&app, &client).await;
    let refresh = login["refresh_token"].as_str().unwrap();

    let response = client
        .post(&format!("{}/auth/revoke-token", &app.address))
        .json(&json!({"token": refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let again = client
        .post(&format!("{}/auth/revoke-token", &app.address))
        .json(&json!({"token": refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(400, again.status().as_u16());
}

#[tokio::test]
async fn revoke_returns_404_for_unknown_token() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/revoke-token", &app.address))
        .json(&json!({"token": "no-such-token"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn revoked_token_cannot_refresh() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let login = login_alice(&app, &client).await;
    let refresh = login["refresh_token"].as_str().unwrap();

    client
        .post(&format!("{}/auth/revoke-token", &app.address))
        .json(&json!({"token": refresh}))
        .send()
        .await
        .expect("Failed to execute request.");

    let response = client
        .post(&format!("{}/auth/refresh-token", &app.address))
        .json(&json!({"token": refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

// --- Protected routes ---

#[tokio::test]
async fn me_requires_a_valid_access_token() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    let missing = client
        .get(&format!("{}/api/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, missing.status().as_u16());

    let invalid = client
        .get(&format!("{}/api/me", &app.address))
        .header("Authorization", "Bearer invalid.token.here")
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, invalid.status().as_u16());
}

#[tokio::test]
async fn me_returns_profile_with_valid_token() {
    let app = spawn_app();
    let client = reqwest::Client::new();
    register_alice(&app, &client).await;

    let login = login_alice(&app, &client).await;
    let access_token = login["token"].as_str().unwrap();

    let response = client
        .get(&format!("{}/api/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["roles"], json!(["Customer"]));
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app();
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/health_check", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
}
