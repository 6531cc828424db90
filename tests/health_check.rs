//! Integration tests for the health endpoint

use std::net::TcpListener;
use std::sync::Arc;

use user_accounts::accounts::InMemoryAccountStore;
use user_accounts::auth::{AuthService, InMemorySessionStore};
use user_accounts::configuration::JwtSettings;
use user_accounts::startup::run;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let settings = JwtSettings {
        access_secret: "health-access-secret".to_string(),
        refresh_secret: "health-refresh-secret".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: 7,
        issuer: "test".to_string(),
        hash_cost: 4,
    };
    let auth = AuthService::new(
        settings,
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemorySessionStore::new()),
    )
    .expect("Failed to build auth service");
    let server = run(listener, Arc::new(auth)).expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/v1/health", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["status"], "OK");
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/v1/nope", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}
