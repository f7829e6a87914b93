//! # Aegis Auth
//!
//! `aegis-auth` is the authentication and session-security core of the Aegis
//! assistant. The surrounding assistant (voice, web, calendar, media control)
//! consumes it through a small HTTP surface and only ever learns "is this
//! request authenticated, and at what trust level".
//!
//! ## Model
//!
//! - **Single-tenant bootstrap:** the first (and only) user is created once
//!   via `POST /auth/setup`; any later call fails with `already_initialized`.
//! - **Two first factors:** password or PIN, both Argon2id-hashed. Secrets are
//!   never retrievable; only hash comparison is possible.
//! - **MFA:** TOTP (RFC 6238, ±1 step drift) plus single-use recovery codes.
//!   Between the first and second factor the client holds a signed, stateless
//!   pending-auth token with an enforced TTL.
//! - **Brute-force mitigation:** an in-memory sliding-window rate limiter
//!   keyed by `ip:username`, and a persisted per-account lockout state
//!   machine updated atomically in the database.
//! - **Sessions:** opaque 256-bit ids (only their SHA-256 hash is stored),
//!   idle and absolute expiry, idempotent revocation.
//!
//! Credential-check failures are normalized to `invalid_credentials` with a
//! constant artificial delay so neither timing nor response shape reveals
//! whether a username exists.

pub mod api;
pub mod cli;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
