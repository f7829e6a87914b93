//! End-to-end tests for the auth endpoints, driven through the router
//! against an in-memory database.

use aegis_auth::api;
use aegis_auth::api::handlers::auth::{AuthConfig, AuthState};
use aegis_auth::totp::{TotpCrypto, TotpService};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;

const PASSWORD: &str = "correct horse battery staple";

async fn app() -> Router {
    app_with(|config| config).await
}

async fn app_with(tune: impl FnOnce(AuthConfig) -> AuthConfig) -> Router {
    // One connection so the in-memory database is shared.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();

    // Time cost 1 keeps Argon2id fast enough for tests.
    let config = tune(AuthConfig::new(SecretString::from("integration-secret")).with_hash_time_cost(1));
    let state = Arc::new(AuthState::new(config));
    api::router(pool, state, TotpService::new(TotpCrypto::plaintext()))
}

async fn request(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
    session: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(sid) = session {
        builder = builder.header("x-session-id", sid);
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn post(app: &Router, path: &str, body: Value, session: Option<&str>) -> (StatusCode, Value) {
    request(app, "POST", path, Some(body), session).await
}

async fn bootstrap(app: &Router) {
    let (status, body) = post(
        app,
        "/auth/setup",
        json!({"username": "admin", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
}

async fn pending_token(app: &Router) -> String {
    let (status, body) = post(
        app,
        "/auth/login",
        json!({"username": "admin", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mfa_required"], json!(true));
    body["pending_token"].as_str().unwrap().to_string()
}

async fn login_session(app: &Router) -> String {
    let (status, body) = post(
        app,
        "/auth/login",
        json!({"username": "admin", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mfa_required"], json!(false));
    body["session_id"].as_str().unwrap().to_string()
}

fn code_for(base32_secret: &str) -> String {
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(base32_secret.to_string()).to_bytes().unwrap(),
        Some("Aegis".to_string()),
        "admin".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

#[tokio::test]
async fn bootstrap_is_one_shot() {
    let app = app().await;
    bootstrap(&app).await;

    let (status, body) = post(
        &app,
        "/auth/setup",
        json!({"username": "someone-else", "pin": "482913"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("already_initialized"));
}

#[tokio::test]
async fn setup_validates_inputs() {
    let app = app().await;

    let (status, body) = post(&app, "/auth/setup", json!({"username": "admin"}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing_secret"));

    // Empty strings count as absent.
    let (status, body) = post(
        &app,
        "/auth/setup",
        json!({"username": "admin", "password": "", "pin": ""}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing_secret"));

    let (status, body) = post(
        &app,
        "/auth/setup",
        json!({"username": "admin", "password": "short"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("password_too_short"));

    let (status, body) = post(
        &app,
        "/auth/setup",
        json!({"username": "admin", "pin": "12345"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid_pin_length"));

    let (status, body) = post(
        &app,
        "/auth/setup",
        json!({"username": "ab", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid_username"));
}

#[tokio::test]
async fn login_and_me_round_trip() {
    let app = app().await;
    bootstrap(&app).await;
    let session = login_session(&app).await;

    let (status, body) = request(&app, "GET", "/auth/me", None, Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], json!("admin"));
    assert_eq!(body["mfa_enabled"], json!(false));
}

#[tokio::test]
async fn login_rejects_bad_inputs() {
    let app = app().await;
    bootstrap(&app).await;

    let (status, body) = post(&app, "/auth/login", json!({"username": "admin"}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing_secret"));

    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "password": "", "pin": ""}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing_secret"));

    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "password": "wrong password here"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("invalid_credentials"));

    // Unknown users are indistinguishable from wrong secrets.
    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "nobody", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("invalid_credentials"));
}

#[tokio::test]
async fn pin_is_a_first_class_factor() {
    let app = app().await;
    let (status, _) = post(
        &app,
        "/auth/setup",
        json!({"username": "admin", "pin": "482913"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "pin": "482913"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_string());

    // No password is configured, so the password path never matches.
    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "password": "482913"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("invalid_credentials"));
}

#[tokio::test]
async fn mfa_enable_verify_round_trip() {
    let app = app().await;
    bootstrap(&app).await;
    let session = login_session(&app).await;

    let (status, body) = post(&app, "/auth/mfa/enable", json!({}), Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    let secret = body["secret"].as_str().unwrap().to_string();
    assert!(body["otpauth_uri"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    // Next login now requires the second factor.
    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mfa_required"], json!(true));
    assert!(body.get("session_id").is_none());
    let pending = body["pending_token"].as_str().unwrap().to_string();

    // A wrong code is rejected without burning the pending token.
    let (status, body) = post(
        &app,
        "/auth/mfa/verify",
        json!({"pending_token": pending, "code": "000000"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("mfa_invalid"));

    let (status, body) = post(
        &app,
        "/auth/mfa/verify",
        json!({"pending_token": pending, "code": code_for(&secret)}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    let session = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = request(&app, "GET", "/auth/me", None, Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mfa_enabled"], json!(true));
}

#[tokio::test]
async fn tampered_pending_token_is_mfa_invalid() {
    let app = app().await;
    bootstrap(&app).await;

    let (status, body) = post(
        &app,
        "/auth/mfa/verify",
        json!({"pending_token": "bogus.token", "code": "123456"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("mfa_invalid"));
}

#[tokio::test]
async fn recovery_codes_are_single_use() {
    let app = app().await;
    bootstrap(&app).await;
    let session = login_session(&app).await;

    let (status, _) = post(&app, "/auth/mfa/enable", json!({}), Some(&session)).await;
    assert_eq!(status, StatusCode::OK);

    // The pre-enrollment session is mfa_verified, so it can manage
    // recovery codes.
    let (status, body) = post(
        &app,
        "/auth/recovery-codes/regenerate",
        json!({}),
        Some(&session),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<String> = body["codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes.len(), 10);

    let token = pending_token(&app).await;
    let (status, body) = post(
        &app,
        "/auth/mfa/verify",
        json!({"pending_token": token, "recovery_code": codes[0]}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_string());

    // Same code again never works.
    let token = pending_token(&app).await;
    let (status, body) = post(
        &app,
        "/auth/mfa/verify",
        json!({"pending_token": token, "recovery_code": codes[0]}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("mfa_invalid"));

    // A different code from the batch still does.
    let token = pending_token(&app).await;
    let (status, _) = post(
        &app,
        "/auth/mfa/verify",
        json!({"pending_token": token, "recovery_code": codes[1]}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn mfa_disable_requires_verified_session_and_clears_enrollment() {
    let app = app().await;
    bootstrap(&app).await;
    let session = login_session(&app).await;

    let (status, _) = post(&app, "/auth/mfa/enable", json!({}), Some(&session)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/auth/mfa/disable", json!({}), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("not_authenticated"));

    let (status, body) = post(&app, "/auth/mfa/disable", json!({}), Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));

    // With MFA off, login goes straight to a session again.
    let session = login_session(&app).await;
    let (status, body) = request(&app, "GET", "/auth/me", None, Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mfa_enabled"], json!(false));
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = app().await;
    bootstrap(&app).await;
    let session = login_session(&app).await;

    let (status, body) = post(&app, "/auth/logout", json!({}), Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));

    let (status, body) = request(&app, "GET", "/auth/me", None, Some(&session)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("session_invalid_or_expired"));

    // Again, and with a session id that never existed.
    let (status, body) = post(&app, "/auth/logout", json!({}), Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    let (status, _) = post(&app, "/auth/logout", json!({}), Some("no-such-session")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&app, "GET", "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("not_authenticated"));
}

#[tokio::test]
async fn login_attempts_are_rate_limited() {
    let app = app_with(|config| config.with_login_rate_max(3)).await;
    bootstrap(&app).await;

    for _ in 0..3 {
        let (status, _) = post(
            &app,
            "/auth/login",
            json!({"username": "admin", "password": "wrong password here"}),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], json!("rate_limited"));
}

#[tokio::test]
async fn account_locks_after_repeated_failures() {
    let app = app_with(|config| config.with_lockout_threshold(3)).await;
    bootstrap(&app).await;

    for _ in 0..3 {
        let (status, _) = post(
            &app,
            "/auth/login",
            json!({"username": "admin", "password": "wrong password here"}),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Even the correct secret is refused while locked.
    let (status, body) = post(
        &app,
        "/auth/login",
        json!({"username": "admin", "password": PASSWORD}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"], json!("account_locked"));
}

#[tokio::test]
async fn failures_below_threshold_reset_on_success() {
    let app = app_with(|config| config.with_lockout_threshold(3)).await;
    bootstrap(&app).await;

    for _ in 0..2 {
        let (status, _) = post(
            &app,
            "/auth/login",
            json!({"username": "admin", "password": "wrong password here"}),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    login_session(&app).await;

    // The counter restarted: two more failures still do not lock.
    for _ in 0..2 {
        let (status, _) = post(
            &app,
            "/auth/login",
            json!({"username": "admin", "password": "wrong password here"}),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    login_session(&app).await;
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = app().await;
    let (status, body) = request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], json!("ok"));
    assert_eq!(body["name"], json!("aegis-auth"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = app().await;
    let (status, body) = request(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/auth/login").is_some());
}
