use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// At-rest cipher for TOTP secrets.
///
/// With a key, `seal` returns `nonce (12 bytes) || ciphertext`; without one,
/// secrets pass through unchanged (single-user deployments may accept that
/// trade-off, the server warns at startup).
#[derive(Clone)]
pub struct TotpCrypto {
    key: Option<[u8; KEY_LEN]>,
}

impl TotpCrypto {
    #[must_use]
    pub fn plaintext() -> Self {
        Self { key: None }
    }

    /// Build a cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    /// Returns an error if the input is not valid base64 or not 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| anyhow!("MFA encryption key is not valid base64"))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow!("MFA encryption key must be exactly {KEY_LEN} bytes"))?;
        Ok(Self { key: Some(key) })
    }

    /// Encrypt a TOTP secret for storage.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn seal(&self, secret: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = &self.key else {
            return Ok(secret.to_vec());
        };

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, secret)
            .map_err(|e| anyhow!("encryption failure: {e}"))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt a stored TOTP secret.
    ///
    /// # Errors
    /// Returns an error if the blob is malformed or fails authentication.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = &self.key else {
            return Ok(data.to_vec());
        };

        if data.len() < NONCE_LEN {
            return Err(anyhow!("stored TOTP secret is too short"));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow!("decryption failure: {e}"))
    }
}
