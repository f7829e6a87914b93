use crate::{
    api,
    api::handlers::auth::AuthConfig,
    totp::{TotpCrypto, TotpService},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

/// Everything the server action needs, resolved from flags and environment.
#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub db_path: String,
    pub secret_key: SecretString,
    pub mfa_enc_key: Option<SecretString>,
    pub hash_time_cost: u32,
    pub password_min_len: usize,
    pub pin_len: usize,
    pub login_rate_window: i64,
    pub login_rate_max: usize,
    pub lockout_threshold: i64,
    pub lockout_window: i64,
    pub lockout_duration: i64,
    pub session_idle_timeout: i64,
    pub session_absolute_timeout: i64,
    pub session_cookie_name: String,
    pub secure_cookies: bool,
    pub require_mfa: bool,
    pub pending_token_ttl: i64,
    pub recovery_code_count: usize,
}

/// Run the HTTP server until shutdown.
///
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn handle(args: Args) -> Result<()> {
    let config = AuthConfig::new(args.secret_key)
        .with_hash_time_cost(args.hash_time_cost)
        .with_password_min_len(args.password_min_len)
        .with_pin_len(args.pin_len)
        .with_login_rate_window(args.login_rate_window)
        .with_login_rate_max(args.login_rate_max)
        .with_lockout_threshold(args.lockout_threshold)
        .with_lockout_window(args.lockout_window)
        .with_lockout_duration(args.lockout_duration)
        .with_session_idle_timeout(args.session_idle_timeout)
        .with_session_absolute_timeout(args.session_absolute_timeout)
        .with_session_cookie_name(args.session_cookie_name)
        .with_secure_cookies(args.secure_cookies)
        .with_require_mfa(args.require_mfa)
        .with_pending_token_ttl(args.pending_token_ttl)
        .with_recovery_code_count(args.recovery_code_count);

    let totp_crypto = match &args.mfa_enc_key {
        Some(key) => TotpCrypto::from_base64_key(key.expose_secret())
            .context("invalid AEGIS_MFA_ENC_KEY: expected base64-encoded 32 bytes")?,
        None => {
            warn!("No MFA encryption key configured; TOTP secrets are stored unencrypted");
            TotpCrypto::plaintext()
        }
    };
    let totp_service = TotpService::new(totp_crypto);

    api::new(args.port, &args.db_path, config, totp_service).await
}
