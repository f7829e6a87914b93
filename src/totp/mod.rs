//! TOTP provisioning and verification (RFC 6238).
//!
//! Secrets are sealed with ChaCha20-Poly1305 before they touch the database
//! when an at-rest key is configured; otherwise they are stored as generated.

mod crypto;
mod service;

pub use crypto::TotpCrypto;
pub use service::{ProvisionedSecret, TotpService};
