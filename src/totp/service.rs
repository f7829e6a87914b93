use crate::totp::TotpCrypto;
use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const ISSUER: &str = "Aegis";
const TOTP_DIGITS: usize = 6;
// ±1 step tolerated to absorb authenticator clock drift.
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// A freshly provisioned TOTP secret: plaintext forms for the user,
/// sealed form for storage. The plaintext is returned exactly once.
pub struct ProvisionedSecret {
    pub base32: String,
    pub otpauth_uri: String,
    pub sealed: Vec<u8>,
}

#[derive(Clone)]
pub struct TotpService {
    crypto: TotpCrypto,
}

impl TotpService {
    #[must_use]
    pub fn new(crypto: TotpCrypto) -> Self {
        Self { crypto }
    }

    /// Generate a new random secret and the otpauth URI for authenticator apps.
    ///
    /// # Errors
    /// Returns an error if secret generation or sealing fails.
    pub fn provision(&self, account: &str) -> Result<ProvisionedSecret> {
        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| anyhow!("secret generation error: {e}"))?;

        let totp = build_totp(secret_bytes.clone(), account)?;
        let sealed = self.crypto.seal(&secret_bytes)?;

        Ok(ProvisionedSecret {
            base32: totp.get_secret_base32(),
            otpauth_uri: totp.get_url(),
            sealed,
        })
    }

    /// Check a submitted code against a stored (sealed) secret.
    ///
    /// Malformed codes and undecryptable blobs are both "no match"; the caller
    /// never learns which.
    ///
    /// # Errors
    /// Returns an error only on internal TOTP construction failure.
    pub fn verify(&self, sealed: &[u8], code: &str) -> Result<bool> {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let Ok(secret_bytes) = self.crypto.open(sealed) else {
            return Ok(false);
        };

        let totp = build_totp(secret_bytes, "user")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }
}

fn build_totp(secret: Vec<u8>, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret,
        Some(ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> TotpService {
        TotpService::new(TotpCrypto::plaintext())
    }

    #[test]
    fn provision_returns_uri_and_base32() {
        let provisioned = service().provision("admin").unwrap();
        assert!(!provisioned.base32.is_empty());
        assert!(provisioned.otpauth_uri.starts_with("otpauth://totp/"));
        assert!(provisioned.otpauth_uri.contains("issuer=Aegis"));
    }

    #[test]
    fn current_code_verifies() {
        let svc = service();
        let provisioned = svc.provision("admin").unwrap();
        let totp = build_totp(svc.crypto.open(&provisioned.sealed).unwrap(), "user").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(svc.verify(&provisioned.sealed, &code).unwrap());
    }

    #[test]
    fn one_step_drift_accepted_two_rejected() {
        let svc = service();
        let provisioned = svc.provision("admin").unwrap();
        let secret = svc.crypto.open(&provisioned.sealed).unwrap();
        let totp = build_totp(secret, "user").unwrap();

        let now = 1_000_000u64;
        let early = totp.generate(now - TOTP_STEP);
        let late = totp.generate(now + TOTP_STEP);
        let stale = totp.generate(now - 2 * TOTP_STEP);

        assert!(totp.check(&early, now));
        assert!(totp.check(&late, now));
        assert!(!totp.check(&stale, now));
    }

    #[test]
    fn malformed_codes_are_rejected_without_error() {
        let svc = service();
        let provisioned = svc.provision("admin").unwrap();
        assert!(!svc.verify(&provisioned.sealed, "12345").unwrap());
        assert!(!svc.verify(&provisioned.sealed, "abcdef").unwrap());
        assert!(!svc.verify(&provisioned.sealed, "1234567").unwrap());
    }

    #[test]
    fn sealed_blob_from_other_key_never_matches() {
        let keyed = TotpService::new(
            TotpCrypto::from_base64_key(&base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                [9u8; 32],
            ))
            .unwrap(),
        );
        let provisioned = keyed.provision("admin").unwrap();
        // Same blob read by a server configured without the key.
        assert!(!service().verify(&provisioned.sealed, "123456").unwrap());
    }
}
