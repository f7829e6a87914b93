//! Authentication and session security for the single owner account.
//!
//! Two first factors (password or PIN), optional TOTP as the second factor
//! with single-use recovery codes, a sliding-window login throttle, a
//! persisted lockout tracker and server-side sessions with both idle and
//! absolute expiry.

pub(crate) mod lockout;
pub mod login;
pub mod mfa;
pub(crate) mod password;
pub(crate) mod pending;
pub(crate) mod rate_limit;
pub mod session;
pub mod state;
pub(crate) mod storage;
pub mod types;

pub use state::{AuthConfig, AuthState};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix seconds; all persisted timestamps use this clock.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

/// Machine-readable error body, `{"error": "<code>"}`.
pub(crate) fn error_response(status: StatusCode, code: &str) -> Response {
    (status, Json(types::ErrorResponse::new(code))).into_response()
}

#[cfg(test)]
mod tests {
    use super::{error_response, unix_now};
    use axum::http::StatusCode;

    #[test]
    fn unix_now_is_past_2023() {
        assert!(unix_now() > 1_672_531_200);
    }

    #[test]
    fn error_response_carries_the_status() {
        let response = error_response(StatusCode::UNAUTHORIZED, "invalid_credentials");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
