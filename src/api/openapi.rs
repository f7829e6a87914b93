//! OpenAPI document for the auth endpoints, served at `/openapi.json`.

use utoipa::OpenApi;

use crate::api::handlers::auth::types::{
    ErrorResponse, LoginRequest, LoginResponse, MeResponse, MfaEnableResponse, MfaVerifyRequest,
    MfaVerifyResponse, OkResponse, RecoveryCodesResponse, SetupRequest, SetupResponse,
};
use crate::api::handlers::health::Health;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::auth::login::setup,
        crate::api::handlers::auth::login::login,
        crate::api::handlers::auth::login::mfa_verify,
        crate::api::handlers::auth::session::logout,
        crate::api::handlers::auth::session::me,
        crate::api::handlers::auth::mfa::enable,
        crate::api::handlers::auth::mfa::disable,
        crate::api::handlers::auth::mfa::regenerate_recovery_codes,
        crate::api::handlers::health::health,
    ),
    components(schemas(
        SetupRequest,
        SetupResponse,
        LoginRequest,
        LoginResponse,
        MfaVerifyRequest,
        MfaVerifyResponse,
        MeResponse,
        MfaEnableResponse,
        RecoveryCodesResponse,
        OkResponse,
        ErrorResponse,
        Health,
    )),
    tags(
        (name = "auth", description = "Authentication and session endpoints"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
