//! Pending-auth token codec.
//!
//! After a successful first factor with MFA outstanding, the client holds a
//! stateless `{username, issued_at}` blob signed with HMAC-SHA256. Nothing is
//! stored server-side: validity rests on the signature plus an enforced TTL,
//! so a captured token cannot be replayed indefinitely.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PendingLogin {
    pub(crate) username: String,
    pub(crate) issued_at: i64,
}

pub(crate) struct PendingTokenCodec {
    key: Vec<u8>,
    ttl_seconds: i64,
}

impl PendingTokenCodec {
    pub(crate) fn new(key: &[u8], ttl_seconds: i64) -> Self {
        Self {
            key: key.to_vec(),
            ttl_seconds,
        }
    }

    /// Mint a signed token carrying who is mid-login.
    ///
    /// # Errors
    /// Returns an error if serialization or signing fails.
    pub(crate) fn issue(&self, username: &str, now: i64) -> Result<String> {
        let claims = PendingLogin {
            username: username.to_string(),
            issued_at: now,
        };
        let payload = serde_json::to_vec(&claims)?;
        let tag = self.sign(&payload)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verify signature and TTL, returning the claims.
    ///
    /// All failure modes collapse into one error; the caller reports them
    /// identically to an invalid MFA code.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, forged, or expired.
    pub(crate) fn parse(&self, token: &str, now: i64) -> Result<PendingLogin> {
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| anyhow!("malformed pending token"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| anyhow!("malformed pending token payload"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| anyhow!("malformed pending token signature"))?;

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| anyhow!("invalid signing key length"))?;
        mac.update(&payload);
        mac.verify_slice(&tag)
            .map_err(|_| anyhow!("pending token signature mismatch"))?;

        let claims: PendingLogin =
            serde_json::from_slice(&payload).map_err(|_| anyhow!("invalid pending token claims"))?;

        if now - claims.issued_at > self.ttl_seconds {
            return Err(anyhow!("pending token expired"));
        }

        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| anyhow!("invalid signing key length"))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::PendingTokenCodec;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> PendingTokenCodec {
        PendingTokenCodec::new(b"unit-test-signing-key", 300)
    }

    #[test]
    fn issue_parse_round_trip() {
        let token = codec().issue("admin", NOW).unwrap();
        let claims = codec().parse(&token, NOW + 10).unwrap();
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.issued_at, NOW);
    }

    #[test]
    fn token_is_url_safe() {
        let token = codec().issue("admin", NOW).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn expired_token_rejected() {
        let token = codec().issue("admin", NOW).unwrap();
        assert!(codec().parse(&token, NOW + 301).is_err());
        assert!(codec().parse(&token, NOW + 300).is_ok());
    }

    #[test]
    fn wrong_key_rejected() {
        let token = codec().issue("admin", NOW).unwrap();
        let other = PendingTokenCodec::new(b"different-key", 300);
        assert!(other.parse(&token, NOW).is_err());
    }

    #[test]
    fn tampered_payload_rejected() {
        let token = codec().issue("admin", NOW).unwrap();
        let (payload, tag) = token.split_once('.').unwrap();
        let mut forged = payload.to_string();
        // Flip one payload character while keeping the original signature.
        forged.replace_range(0..1, if payload.starts_with('A') { "B" } else { "A" });
        assert!(codec().parse(&format!("{forged}.{tag}"), NOW).is_err());
        assert!(codec().parse("garbage", NOW).is_err());
        assert!(codec().parse("a.b.c", NOW).is_err());
    }
}
