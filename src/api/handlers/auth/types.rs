//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Bootstrap request for the single owner account.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetupRequest {
    pub username: String,
    /// Optional long-form secret. At least one of password or PIN is required.
    pub password: Option<String>,
    /// Optional short numeric secret for trusted-device login.
    pub pin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetupResponse {
    pub ok: bool,
    pub user_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: Option<String>,
    pub pin: Option<String>,
}

/// Either a session (MFA off) or a short-lived pending token (MFA on).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub mfa_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MfaVerifyRequest {
    pub pending_token: String,
    /// Six-digit authenticator code.
    pub code: Option<String>,
    /// Single-use recovery code, accepted instead of an authenticator code.
    pub recovery_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MfaVerifyResponse {
    pub ok: bool,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub mfa_enabled: bool,
}

/// Returned once at enrollment; the secret is never shown again.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MfaEnableResponse {
    pub secret: String,
    pub otpauth_uri: String,
}

/// Returned once at generation; only hashes are stored.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecoveryCodesResponse {
    pub codes: Vec<String>,
}

/// Machine-readable error code, never free-form text.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(code: &str) -> Self {
        Self {
            error: code.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{ErrorResponse, LoginResponse};

    #[test]
    fn login_response_omits_absent_fields() {
        let body = serde_json::to_string(&LoginResponse {
            mfa_required: true,
            session_id: None,
            pending_token: Some("tok".to_string()),
        })
        .unwrap();
        assert!(!body.contains("session_id"));
        assert!(body.contains("pending_token"));
    }

    #[test]
    fn error_response_shape() {
        let body = serde_json::to_string(&ErrorResponse::new("invalid_credentials")).unwrap();
        assert_eq!(body, r#"{"error":"invalid_credentials"}"#);
    }
}
