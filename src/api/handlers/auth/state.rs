//! Auth configuration and shared state.

use secrecy::{ExposeSecret, SecretString};

use super::{
    lockout::LockoutPolicy,
    pending::PendingTokenCodec,
    rate_limit::SlidingWindowLimiter,
};

const DEFAULT_HASH_TIME_COST: u32 = 3;
const DEFAULT_PASSWORD_MIN_LEN: usize = 12;
const DEFAULT_PIN_LEN: usize = 6;
const DEFAULT_LOGIN_RATE_WINDOW_SECONDS: i64 = 5 * 60;
const DEFAULT_LOGIN_RATE_MAX_ATTEMPTS: usize = 20;
const DEFAULT_LOCKOUT_THRESHOLD: i64 = 5;
const DEFAULT_LOCKOUT_WINDOW_SECONDS: i64 = 15 * 60;
const DEFAULT_LOCKOUT_DURATION_SECONDS: i64 = 15 * 60;
const DEFAULT_SESSION_IDLE_TIMEOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_SESSION_ABSOLUTE_TIMEOUT_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_COOKIE_NAME: &str = "aegis_session";
const DEFAULT_PENDING_TOKEN_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_RECOVERY_CODE_COUNT: usize = 10;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    secret_key: SecretString,
    hash_time_cost: u32,
    password_min_len: usize,
    pin_len: usize,
    login_rate_window: i64,
    login_rate_max: usize,
    lockout_threshold: i64,
    lockout_window: i64,
    lockout_duration: i64,
    session_idle_timeout: i64,
    session_absolute_timeout: i64,
    session_cookie_name: String,
    secure_cookies: bool,
    require_mfa: bool,
    pending_token_ttl: i64,
    recovery_code_count: usize,
}

impl AuthConfig {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            secret_key,
            hash_time_cost: DEFAULT_HASH_TIME_COST,
            password_min_len: DEFAULT_PASSWORD_MIN_LEN,
            pin_len: DEFAULT_PIN_LEN,
            login_rate_window: DEFAULT_LOGIN_RATE_WINDOW_SECONDS,
            login_rate_max: DEFAULT_LOGIN_RATE_MAX_ATTEMPTS,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_window: DEFAULT_LOCKOUT_WINDOW_SECONDS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION_SECONDS,
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT_SECONDS,
            session_absolute_timeout: DEFAULT_SESSION_ABSOLUTE_TIMEOUT_SECONDS,
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            secure_cookies: false,
            require_mfa: false,
            pending_token_ttl: DEFAULT_PENDING_TOKEN_TTL_SECONDS,
            recovery_code_count: DEFAULT_RECOVERY_CODE_COUNT,
        }
    }

    #[must_use]
    pub fn with_hash_time_cost(mut self, cost: u32) -> Self {
        self.hash_time_cost = cost;
        self
    }

    #[must_use]
    pub fn with_password_min_len(mut self, len: usize) -> Self {
        self.password_min_len = len;
        self
    }

    #[must_use]
    pub fn with_pin_len(mut self, len: usize) -> Self {
        self.pin_len = len;
        self
    }

    #[must_use]
    pub fn with_login_rate_window(mut self, seconds: i64) -> Self {
        self.login_rate_window = seconds;
        self
    }

    #[must_use]
    pub fn with_login_rate_max(mut self, attempts: usize) -> Self {
        self.login_rate_max = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: i64) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lockout_window(mut self, seconds: i64) -> Self {
        self.lockout_window = seconds;
        self
    }

    #[must_use]
    pub fn with_lockout_duration(mut self, seconds: i64) -> Self {
        self.lockout_duration = seconds;
        self
    }

    #[must_use]
    pub fn with_session_idle_timeout(mut self, seconds: i64) -> Self {
        self.session_idle_timeout = seconds;
        self
    }

    #[must_use]
    pub fn with_session_absolute_timeout(mut self, seconds: i64) -> Self {
        self.session_absolute_timeout = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: String) -> Self {
        self.session_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_require_mfa(mut self, required: bool) -> Self {
        self.require_mfa = required;
        self
    }

    #[must_use]
    pub fn with_pending_token_ttl(mut self, seconds: i64) -> Self {
        self.pending_token_ttl = seconds;
        self
    }

    #[must_use]
    pub fn with_recovery_code_count(mut self, count: usize) -> Self {
        self.recovery_code_count = count;
        self
    }

    pub(crate) fn hash_time_cost(&self) -> u32 {
        self.hash_time_cost
    }

    pub(crate) fn password_min_len(&self) -> usize {
        self.password_min_len
    }

    pub(crate) fn pin_len(&self) -> usize {
        self.pin_len
    }

    pub(crate) fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            threshold: self.lockout_threshold,
            window_seconds: self.lockout_window,
            duration_seconds: self.lockout_duration,
        }
    }

    pub(crate) fn session_idle_timeout(&self) -> i64 {
        self.session_idle_timeout
    }

    pub(crate) fn session_absolute_timeout(&self) -> i64 {
        self.session_absolute_timeout
    }

    pub(crate) fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }

    pub(crate) fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    pub(crate) fn require_mfa(&self) -> bool {
        self.require_mfa
    }

    pub(crate) fn recovery_code_count(&self) -> usize {
        self.recovery_code_count
    }
}

/// Shared per-process auth state: configuration, the pending-token codec and
/// the in-memory rate limiter. Injected into handlers as an `Extension<Arc<_>>`.
pub struct AuthState {
    config: AuthConfig,
    pending: PendingTokenCodec,
    rate_limiter: SlidingWindowLimiter,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let pending = PendingTokenCodec::new(
            config.secret_key.expose_secret().as_bytes(),
            config.pending_token_ttl,
        );
        let rate_limiter =
            SlidingWindowLimiter::new(config.login_rate_window, config.login_rate_max);
        Self {
            config,
            pending,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn pending(&self) -> &PendingTokenCodec {
        &self.pending
    }

    pub(crate) fn rate_limiter(&self) -> &SlidingWindowLimiter {
        &self.rate_limiter
    }
}
