//! Session transport, the auth guard and the session endpoints.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;

use super::{
    error_response,
    state::{AuthConfig, AuthState},
    storage::{get_valid_session, hash_session_token, lookup_user_by_id, revoke_session, SessionRecord},
    types::{MeResponse, OkResponse},
    unix_now,
};

const SESSION_HEADER: &str = "x-session-id";

/// Pull the session id out of a request, in priority order: the dedicated
/// header, the cookie, then `Authorization: Session <id>`.
pub(super) fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(value) = headers.get(SESSION_HEADER) {
        let token = value.to_str().ok()?.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    if let Some(token) = extract_cookie_token(headers, cookie_name) {
        return Some(token);
    }
    extract_authorization_token(headers)
}

fn extract_cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == cookie_name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_authorization_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.trim().strip_prefix("Session ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Build the `HttpOnly` cookie carrying the session id.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.session_cookie_name();
    let max_age = config.session_absolute_timeout();
    let mut cookie = format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.session_cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Resolve the request's session or produce the error response.
///
/// With `require_mfa_verified`, sessions minted before MFA completion are
/// rejected; sensitive endpoints pass `true`.
pub(super) async fn require_session(
    headers: &HeaderMap,
    pool: &SqlitePool,
    state: &AuthState,
    require_mfa_verified: bool,
) -> Result<SessionRecord, Response> {
    let Some(token) = extract_session_token(headers, state.config().session_cookie_name()) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "not_authenticated",
        ));
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    let record = get_valid_session(
        pool,
        &token_hash,
        unix_now(),
        state.config().session_idle_timeout(),
    )
    .await
    .map_err(|err| {
        error!("Failed to lookup session: {err}");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })?;

    // Sensitive endpoints get one opaque code for both "no session" and
    // "session lacks MFA" so they cannot be probed apart.
    let invalid_code = if require_mfa_verified {
        "mfa_required_or_session_invalid"
    } else {
        "session_invalid_or_expired"
    };

    let Some(record) = record else {
        return Err(error_response(StatusCode::UNAUTHORIZED, invalid_code));
    };

    if require_mfa_verified && !record.mfa_verified {
        return Err(error_response(StatusCode::UNAUTHORIZED, invalid_code));
    }

    Ok(record)
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current account", body = MeResponse),
        (status = 401, description = "No valid session", body = super::types::ErrorResponse),
        (status = 404, description = "Session points at a missing user", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    let record = match require_session(&headers, &pool, &state, false).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    match lookup_user_by_id(&pool, record.user_id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(MeResponse {
                id: user.id,
                username: user.username,
                mfa_enabled: user.mfa_enabled,
            }),
        )
            .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "user_not_found"),
        Err(err) => {
            error!("Failed to lookup user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session revoked and cookie cleared", body = super::types::OkResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    if let Some(token) = extract_session_token(&headers, state.config().session_cookie_name()) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = revoke_session(&pool, &token_hash).await {
            error!("Failed to revoke session: {err}");
        }
    }

    // Always clear the cookie, even if no session record was found.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(OkResponse { ok: true }),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{clear_session_cookie, extract_session_token, session_cookie};
    use crate::api::handlers::auth::state::AuthConfig;
    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
    use secrecy::SecretString;

    fn config() -> AuthConfig {
        AuthConfig::new(SecretString::from("unit-test-key"))
    }

    #[test]
    fn header_wins_over_cookie_and_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", HeaderValue::from_static("from-header"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("aegis_session=from-cookie"),
        );
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Session from-auth"));
        assert_eq!(
            extract_session_token(&headers, "aegis_session").as_deref(),
            Some("from-header")
        );

        headers.remove("x-session-id");
        assert_eq!(
            extract_session_token(&headers, "aegis_session").as_deref(),
            Some("from-cookie")
        );

        headers.remove(axum::http::header::COOKIE);
        assert_eq!(
            extract_session_token(&headers, "aegis_session").as_deref(),
            Some("from-auth")
        );
    }

    #[test]
    fn cookie_parsing_handles_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; aegis_session=abc123; lang=en"),
        );
        assert_eq!(
            extract_session_token(&headers, "aegis_session").as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_session_token(&headers, "other"), None);
    }

    #[test]
    fn bearer_scheme_is_not_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_session_token(&headers, "aegis_session"), None);
    }

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie(&config(), "abc123").unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("aegis_session=abc123; "));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=86400"));
        assert!(!value.contains("Secure"));

        let secure = session_cookie(&config().with_secure_cookies(true), "abc123").unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));

        let cleared = clear_session_cookie(&config()).unwrap();
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
    }
}
