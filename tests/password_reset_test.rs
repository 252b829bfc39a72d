// Integration tests for the password-reset flow:
// forgot-password -> verify-reset-code -> reset-password.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use gramboard::api::{create_api_router, AppState};
use gramboard::email::ConsoleEmailSender;
use gramboard::password::hash_password;
use gramboard::store::{MemoryStore, NewUser, Role, Store};
use gramboard::token::TokenService;
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(store: Arc<MemoryStore>) -> Router {
    create_api_router(AppState {
        store,
        tokens: TokenService::new(
            "test-access".to_string(),
            "test-refresh".to_string(),
            "test-state".to_string(),
        ),
        email: Arc::new(ConsoleEmailSender),
        meta: None,
        frontend_url: "http://localhost:3000".to_string(),
    })
}

fn seed_user(store: &MemoryStore, email: &str, password: &str) {
    store
        .create_user(NewUser {
            email: email.to_string(),
            name: "Alice".to_string(),
            password_hash: hash_password(password).unwrap(),
            role: Role::Client,
            company_id: None,
        })
        .unwrap();
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

/// Pull the reset code out of storage, standing in for reading the email.
fn stored_code(store: &MemoryStore, email: &str) -> String {
    store
        .find_user_by_email(email)
        .unwrap()
        .unwrap()
        .reset_code
        .expect("reset code should be set")
}

#[tokio::test]
async fn test_forgot_password_same_answer_for_unknown_email() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    let (status, known) = post_json(
        app.clone(),
        "/api/auth/forgot-password",
        serde_json::json!({"email": "a@x.com"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, unknown) = post_json(
        app,
        "/api/auth/forgot-password",
        serde_json::json!({"email": "nobody@x.com"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Identical body either way, so the endpoint cannot probe for accounts.
    assert_eq!(known, unknown);

    // But only the real account got a code.
    let user = store.find_user_by_email("a@x.com").unwrap().unwrap();
    assert!(user.reset_code.is_some());
    assert_eq!(user.reset_code.as_deref().unwrap().len(), 6);
}

#[tokio::test]
async fn test_forgot_password_rejects_invalid_email() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let (status, _) = post_json(
        app,
        "/api/auth/forgot-password",
        serde_json::json!({"email": "not-an-email"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_reset_code_checks_email_binding() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    post_json(
        app.clone(),
        "/api/auth/forgot-password",
        serde_json::json!({"email": "a@x.com"}),
    )
    .await;
    let code = stored_code(&store, "a@x.com");

    // Right code, right email.
    let (status, body) = post_json(
        app.clone(),
        "/api/auth/verify-reset-code",
        serde_json::json!({"email": "a@x.com", "code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    // Right code, wrong email.
    let (status, body) = post_json(
        app.clone(),
        "/api/auth/verify-reset-code",
        serde_json::json!({"email": "b@x.com", "code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired code");

    // Wrong code.
    let (status, body) = post_json(
        app,
        "/api/auth/verify-reset-code",
        serde_json::json!({"email": "a@x.com", "code": "000000"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired code");
}

#[tokio::test]
async fn test_reset_password_full_cycle_and_single_use() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "old-password");
    let app = create_test_app(store.clone());

    post_json(
        app.clone(),
        "/api/auth/forgot-password",
        serde_json::json!({"email": "a@x.com"}),
    )
    .await;
    let code = stored_code(&store, "a@x.com");

    let (status, _) = post_json(
        app.clone(),
        "/api/auth/reset-password",
        serde_json::json!({"email": "a@x.com", "code": code, "newPassword": "new-password"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // New password works, old one does not.
    let (status, _) = post_json(
        app.clone(),
        "/api/auth/login",
        serde_json::json!({"email": "a@x.com", "password": "new-password"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_json(
        app.clone(),
        "/api/auth/login",
        serde_json::json!({"email": "a@x.com", "password": "old-password"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Replaying the consumed code fails.
    let (status, body) = post_json(
        app,
        "/api/auth/reset-password",
        serde_json::json!({"email": "a@x.com", "code": code, "newPassword": "another-password"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired code");
}

#[tokio::test]
async fn test_reset_password_enforces_minimum_length() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    post_json(
        app.clone(),
        "/api/auth/forgot-password",
        serde_json::json!({"email": "a@x.com"}),
    )
    .await;
    let code = stored_code(&store, "a@x.com");

    let (status, _) = post_json(
        app,
        "/api/auth/reset-password",
        serde_json::json!({"email": "a@x.com", "code": code, "newPassword": "short"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The code survived the rejected attempt.
    assert_eq!(stored_code(&store, "a@x.com"), code);
}

#[tokio::test]
async fn test_expired_code_rejected() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "a@x.com", "hunter22");
    let app = create_test_app(store.clone());

    // Plant an already-expired code directly.
    store
        .set_reset_code(
            "a@x.com",
            "123456",
            chrono::Utc::now() - chrono::Duration::minutes(1),
        )
        .unwrap();

    let (status, body) = post_json(
        app,
        "/api/auth/verify-reset-code",
        serde_json::json!({"email": "a@x.com", "code": "123456"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired code");
}
