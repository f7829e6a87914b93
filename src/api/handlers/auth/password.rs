//! Password and PIN hashing using Argon2id.
//!
//! The same hasher also covers recovery codes. Verification failure and
//! malformed stored hashes are both "no match" so callers cannot tell which
//! factor is configured.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;

// Argon2id memory cost in KiB; the time cost is the configurable work factor.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const PARALLELISM: u32 = 1;

fn hasher(time_cost: u32) -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, time_cost, PARALLELISM, None)
        .map_err(|_| anyhow!("invalid Argon2id parameters"))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hash a secret for storage as a PHC string.
///
/// # Errors
/// Returns an error if hashing fails.
pub(crate) fn hash(secret: &str, time_cost: u32) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(time_cost)?
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash secret"))?
        .to_string();
    Ok(hash)
}

/// Verify a secret against a stored PHC hash. Any failure is "no match".
pub(crate) fn verify(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}
