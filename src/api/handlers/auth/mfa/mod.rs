//! MFA enrollment, teardown and recovery-code management endpoints.

pub(crate) mod recovery;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};

use super::{
    error_response,
    session::require_session,
    state::AuthState,
    storage,
    types::{ErrorResponse, MfaEnableResponse, OkResponse, RecoveryCodesResponse},
};
use crate::totp::TotpService;
use recovery::RecoveryCodeBatch;

#[utoipa::path(
    post,
    path = "/auth/mfa/enable",
    responses(
        (status = 200, description = "Secret provisioned, shown once", body = MfaEnableResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "Session points at a missing user", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn enable(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
    totp: Extension<TotpService>,
) -> Response {
    let record = match require_session(&headers, &pool, &state, false).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    let user = match storage::lookup_user_by_id(&pool, record.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "user_not_found"),
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let provisioned = match totp.provision(&user.username) {
        Ok(provisioned) => provisioned,
        Err(err) => {
            error!("Failed to provision TOTP secret: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = storage::store_totp_secret(&pool, user.id, &provisioned.sealed).await {
        error!("Failed to store TOTP secret: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(username = %user.username, "MFA enabled");
    (
        StatusCode::OK,
        Json(MfaEnableResponse {
            secret: provisioned.base32,
            otpauth_uri: provisioned.otpauth_uri,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/auth/mfa/disable",
    responses(
        (status = 200, description = "MFA disabled", body = OkResponse),
        (status = 401, description = "Requires an MFA-verified session", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn disable(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    // Turning MFA off is sensitive: the session itself must have passed MFA.
    let record = match require_session(&headers, &pool, &state, true).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    if let Err(err) = storage::clear_totp_secret(&pool, record.user_id).await {
        error!("Failed to clear TOTP secret: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(user_id = record.user_id, "MFA disabled");
    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

#[utoipa::path(
    post,
    path = "/auth/recovery-codes/regenerate",
    responses(
        (status = 200, description = "Fresh batch, shown once", body = RecoveryCodesResponse),
        (status = 401, description = "Requires an MFA-verified session", body = ErrorResponse),
        (status = 404, description = "Session points at a missing user", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn regenerate_recovery_codes(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    let record = match require_session(&headers, &pool, &state, true).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    let user = match storage::lookup_user_by_id(&pool, record.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "user_not_found"),
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let batch = match RecoveryCodeBatch::generate(
        state.config().recovery_code_count(),
        state.config().hash_time_cost(),
    ) {
        Ok(batch) => batch,
        Err(err) => {
            error!("Failed to generate recovery codes: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Unused codes from the previous batch stop working here.
    if let Err(err) = storage::replace_recovery_codes(&pool, user.id, &batch.code_hashes).await {
        error!("Failed to store recovery codes: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(username = %user.username, "Recovery codes regenerated");
    (
        StatusCode::OK,
        Json(RecoveryCodesResponse { codes: batch.codes }),
    )
        .into_response()
}
