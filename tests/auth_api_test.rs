// Integration tests for login, refresh, and the current-user endpoint

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use gramboard::api::{create_api_router, AppState};
use gramboard::email::ConsoleEmailSender;
use gramboard::password::hash_password;
use gramboard::store::{MemoryStore, NewOAuthUser, NewUser, Provider, Role, Store};
use gramboard::token::TokenService;
use std::sync::Arc;
use tower::ServiceExt;

fn test_tokens() -> TokenService {
    TokenService::new(
        "test-access".to_string(),
        "test-refresh".to_string(),
        "test-state".to_string(),
    )
}

fn create_test_app(store: Arc<MemoryStore>) -> Router {
    create_api_router(AppState {
        store,
        tokens: test_tokens(),
        email: Arc::new(ConsoleEmailSender),
        meta: None,
        frontend_url: "http://localhost:3000".to_string(),
    })
}

fn seed_user(store: &MemoryStore, email: &str, password: &str) -> i64 {
    store
        .create_user(NewUser {
            email: email.to_string(),
            name: "Alice".to_string(),
            password_hash: hash_password(password).unwrap(),
            role: Role::Client,
            company_id: None,
        })
        .unwrap()
        .id
}

async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_login_success_returns_tokens_and_user() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    let (status, body) = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({"email": "a@x.com", "password": "hunter22"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().unwrap().contains('.'));
    let refresh = body["refreshToken"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["email"], "a@x.com");
    assert!(body["user"].get("passwordHash").is_none());

    // The refresh token was persisted.
    let record = store.find_refresh_token(&refresh).unwrap().unwrap();
    assert!(!record.revoked);
}

#[tokio::test]
async fn test_login_wrong_password_is_401() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store);

    let (status, body) = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({"email": "a@x.com", "password": "wrong"}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_unknown_email_same_error() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let (status, body) = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({"email": "nobody@x.com", "password": "pw"}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_oauth_only_account_names_provider() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_oauth_user(NewOAuthUser {
            email: "g@x.com".to_string(),
            name: "Gil".to_string(),
            provider: Provider::Google,
            provider_id: "g-1".to_string(),
            role: Role::Client,
            company_id: None,
        })
        .unwrap();
    let app = create_test_app(store);

    let (status, body) = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({"email": "g@x.com", "password": "anything"}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("google"));
}

#[tokio::test]
async fn test_login_malformed_body_is_400() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let (status, _) = post_json(app, "/api/auth/login", serde_json::json!({"email": "a@x.com"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_returns_new_access_token() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    let (_, login) = post_json(
        app.clone(),
        "/api/auth/login",
        serde_json::json!({"email": "a@x.com", "password": "hunter22"}),
    )
    .await;
    let refresh_token = login["refreshToken"].as_str().unwrap();

    let (status, body) = post_json(
        app,
        "/api/auth/refresh",
        serde_json::json!({"refreshToken": refresh_token}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().unwrap().contains('.'));
}

#[tokio::test]
async fn test_refresh_missing_token_is_401() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let (status, body) = post_json(app, "/api/auth/refresh", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Refresh token required");
}

#[tokio::test]
async fn test_refresh_token_absent_from_store_is_403() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store);

    // Validly signed but never persisted.
    let token = test_tokens().issue_refresh_token(1).unwrap();
    let (status, body) = post_json(
        app,
        "/api/auth/refresh",
        serde_json::json!({"refreshToken": token}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Invalid or revoked refresh token");
}

#[tokio::test]
async fn test_revoked_refresh_token_rejected_despite_valid_signature() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    let (_, login) = post_json(
        app.clone(),
        "/api/auth/login",
        serde_json::json!({"email": "a@x.com", "password": "hunter22"}),
    )
    .await;
    let refresh_token = login["refreshToken"].as_str().unwrap().to_string();

    store.revoke_refresh_token(&refresh_token).unwrap();

    let (status, body) = post_json(
        app,
        "/api/auth/refresh",
        serde_json::json!({"refreshToken": refresh_token}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Invalid or revoked refresh token");
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let store = Arc::new(MemoryStore::new());
    let user_id = seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store);

    // No header.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Valid access token.
    let access = test_tokens()
        .issue_access_token(user_id, Role::Client, None)
        .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("authorization", format!("Bearer {}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["email"], "a@x.com");
    assert!(body.get("passwordHash").is_none());
}
