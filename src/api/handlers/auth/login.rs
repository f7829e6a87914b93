//! Bootstrap, first-factor login and MFA verification endpoints.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{
    error_response, lockout, mfa, password,
    rate_limit::{login_key, RateLimitDecision},
    session::session_cookie,
    state::{AuthConfig, AuthState},
    storage,
    types::{
        ErrorResponse, LoginRequest, LoginResponse, MfaVerifyRequest, MfaVerifyResponse,
        SetupRequest, SetupResponse,
    },
    unix_now,
};
use crate::totp::TotpService;

// Constant delay on invalid credentials so unknown users and wrong secrets
// are indistinguishable by timing.
const INVALID_CREDENTIALS_DELAY: Duration = Duration::from_millis(250);

const MIN_USERNAME_LEN: usize = 3;

#[utoipa::path(
    post,
    path = "/auth/setup",
    request_body = SetupRequest,
    responses(
        (status = 200, description = "Owner account created", body = SetupResponse),
        (status = 400, description = "Invalid input or already initialized", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn setup(
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
    Json(body): Json<SetupRequest>,
) -> Response {
    let username = body.username.trim();
    if username.len() < MIN_USERNAME_LEN {
        return error_response(StatusCode::BAD_REQUEST, "invalid_username");
    }
    // Empty strings count as absent.
    let pw = body.password.as_deref().filter(|s| !s.is_empty());
    let pin = body.pin.as_deref().filter(|s| !s.is_empty());
    if pw.is_none() && pin.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "missing_secret");
    }
    if let Some(pw) = pw {
        if pw.len() < state.config().password_min_len() {
            return error_response(StatusCode::BAD_REQUEST, "password_too_short");
        }
    }
    if let Some(pin) = pin {
        if pin.len() != state.config().pin_len() || !pin.chars().all(|c| c.is_ascii_digit()) {
            return error_response(StatusCode::BAD_REQUEST, "invalid_pin_length");
        }
    }

    let time_cost = state.config().hash_time_cost();
    let password_hash = match pw.map(|pw| password::hash(pw, time_cost)) {
        Some(Ok(hash)) => Some(hash),
        Some(Err(err)) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        None => None,
    };
    let pin_hash = match pin.map(|pin| password::hash(pin, time_cost)) {
        Some(Ok(hash)) => Some(hash),
        Some(Err(err)) => {
            error!("Failed to hash PIN: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        None => None,
    };

    match storage::create_initial_user(
        &pool,
        username,
        password_hash.as_deref(),
        pin_hash.as_deref(),
        unix_now(),
    )
    .await
    {
        Ok(Some(user_id)) => {
            info!(username, "Owner account created");
            (
                StatusCode::OK,
                Json(SetupResponse { ok: true, user_id }),
            )
                .into_response()
        }
        Ok(None) => error_response(StatusCode::BAD_REQUEST, "already_initialized"),
        Err(err) => {
            error!("Failed to create initial user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened or MFA pending", body = LoginResponse),
        (status = 400, description = "No secret provided", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 423, description = "Account locked", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
    Json(body): Json<LoginRequest>,
) -> Response {
    // Empty strings count as absent; the PIN is the selected factor
    // whenever it is present.
    let pin = body.pin.as_deref().filter(|s| !s.is_empty());
    let pw = body.password.as_deref().filter(|s| !s.is_empty());
    let use_pin = pin.is_some();
    let Some(secret) = pin.or(pw) else {
        return error_response(StatusCode::BAD_REQUEST, "missing_secret");
    };

    let username = body.username.trim();
    let ip = client_ip(&headers);
    let now = unix_now();

    if state.rate_limiter().check(&login_key(&ip, username), now) == RateLimitDecision::Limited {
        warn!(username, ip = %ip, "Login rate limited");
        return error_response(StatusCode::TOO_MANY_REQUESTS, "rate_limited");
    }

    let user = match storage::lookup_user(&pool, username).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let Some(user) = user else {
        tokio::time::sleep(INVALID_CREDENTIALS_DELAY).await;
        return error_response(StatusCode::UNAUTHORIZED, "invalid_credentials");
    };

    // Locked accounts are rejected before any hashing work.
    if lockout::is_locked(&user, now) {
        return error_response(StatusCode::LOCKED, "account_locked");
    }

    let stored_hash = if use_pin {
        user.pin_hash.as_deref()
    } else {
        user.password_hash.as_deref()
    };
    let ok = stored_hash.is_some_and(|hash| password::verify(secret, hash));

    if !ok {
        if let Err(err) =
            lockout::record_failure(&pool, user.id, state.config().lockout_policy(), now).await
        {
            error!("Failed to record login failure: {err}");
        }
        info!(username, ip = %ip, "Login failed");
        tokio::time::sleep(INVALID_CREDENTIALS_DELAY).await;
        return error_response(StatusCode::UNAUTHORIZED, "invalid_credentials");
    }

    if let Err(err) = lockout::reset(&pool, user.id).await {
        error!("Failed to reset lockout counters: {err}");
    }

    let needs_mfa = state.config().require_mfa() || user.mfa_enabled;
    if needs_mfa {
        match state.pending().issue(&user.username, now) {
            Ok(token) => (
                StatusCode::OK,
                Json(LoginResponse {
                    mfa_required: true,
                    session_id: None,
                    pending_token: Some(token),
                }),
            )
                .into_response(),
            Err(err) => {
                error!("Failed to issue pending token: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    } else {
        let (session_id, cookie_headers) = match open_session(&pool, state.config(), user.id, now).await
        {
            Ok(opened) => opened,
            Err(response) => return response,
        };
        info!(username, "Login succeeded");
        (
            StatusCode::OK,
            cookie_headers,
            Json(LoginResponse {
                mfa_required: false,
                session_id: Some(session_id),
                pending_token: None,
            }),
        )
            .into_response()
    }
}

#[utoipa::path(
    post,
    path = "/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "MFA completed, session opened", body = MfaVerifyResponse),
        (status = 401, description = "Invalid token, code or recovery code", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn mfa_verify(
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
    totp: Extension<TotpService>,
    Json(body): Json<MfaVerifyRequest>,
) -> Response {
    let now = unix_now();
    // Forged, malformed and expired tokens all collapse into mfa_invalid.
    let Ok(claims) = state.pending().parse(&body.pending_token, now) else {
        return error_response(StatusCode::UNAUTHORIZED, "mfa_invalid");
    };

    let user = match storage::lookup_user(&pool, &claims.username).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::UNAUTHORIZED, "mfa_invalid"),
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let verified = if let Some(code) = body.code.as_deref().filter(|c| !c.is_empty()) {
        verify_totp(&totp, &user, code)
    } else if let Some(recovery) = body.recovery_code.as_deref().filter(|c| !c.is_empty()) {
        match consume_matching_recovery_code(&pool, user.id, recovery, now).await {
            Ok(consumed) => consumed,
            Err(response) => return response,
        }
    } else {
        false
    };

    if !verified {
        info!(username = %claims.username, "MFA verification failed");
        return error_response(StatusCode::UNAUTHORIZED, "mfa_invalid");
    }

    let (session_id, cookie_headers) = match open_session(&pool, state.config(), user.id, now).await
    {
        Ok(opened) => opened,
        Err(response) => return response,
    };
    info!(username = %claims.username, "MFA verification succeeded");
    (
        StatusCode::OK,
        cookie_headers,
        Json(MfaVerifyResponse {
            ok: true,
            session_id,
        }),
    )
        .into_response()
}

fn verify_totp(totp: &TotpService, user: &storage::UserRecord, code: &str) -> bool {
    let Some(sealed) = user.totp_secret.as_deref() else {
        return false;
    };
    match totp.verify(sealed, code) {
        Ok(matched) => matched,
        Err(err) => {
            error!("Failed to verify TOTP code: {err}");
            false
        }
    }
}

/// Scan the unused batch for a hash match and consume it exactly once.
async fn consume_matching_recovery_code(
    pool: &SqlitePool,
    user_id: i64,
    recovery_code: &str,
    now: i64,
) -> Result<bool, Response> {
    // Hashes are computed over the normalized form.
    let Ok(recovery_code) = mfa::recovery::normalize_recovery_code(recovery_code) else {
        return Ok(false);
    };
    let codes = storage::list_unused_recovery_codes(pool, user_id)
        .await
        .map_err(|err| {
            error!("Failed to list recovery codes: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })?;

    for (code_id, code_hash) in codes {
        if password::verify(&recovery_code, &code_hash) {
            let consumed = storage::consume_recovery_code(pool, code_id, now)
                .await
                .map_err(|err| {
                    error!("Failed to consume recovery code: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                })?;
            // A concurrent request may have burned the code first.
            return Ok(consumed);
        }
    }
    Ok(false)
}

/// Mint a session, returning the raw id and the Set-Cookie header.
pub(super) async fn open_session(
    pool: &SqlitePool,
    config: &AuthConfig,
    user_id: i64,
    now: i64,
) -> Result<(String, HeaderMap), Response> {
    let session_id = storage::insert_session(
        pool,
        user_id,
        true,
        now,
        config.session_absolute_timeout(),
    )
    .await
    .map_err(|err| {
        error!("Failed to create session: {err}");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })?;

    let mut headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(config, &session_id) {
        headers.insert(SET_COOKIE, cookie);
    }
    Ok((session_id, headers))
}

/// First entry of `X-Forwarded-For`, falling back to an opaque marker when
/// the proxy does not supply one.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map_or_else(|| "unknown".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::client_ip;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn missing_header_is_unknown() {
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(client_ip(&headers), "unknown");
    }
}
