//! Recovery code generation helpers.
//!
//! Recovery codes are one-time MFA bypasses for when the authenticator is
//! unavailable. Only Argon2id hashes of the normalized form are stored.

use anyhow::{anyhow, Context, Result};
use rand::{rngs::OsRng, RngCore};

use super::super::password;

const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
// No 0/O/1/I so codes survive being read aloud or written down.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated recovery-code batch (plaintext + hashes).
#[derive(Debug)]
pub(crate) struct RecoveryCodeBatch {
    pub(crate) codes: Vec<String>,
    pub(crate) code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    pub(crate) fn generate(count: usize, time_cost: u32) -> Result<Self> {
        let mut rng = OsRng;
        let mut codes = Vec::with_capacity(count);
        let mut code_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let code = generate_code(&mut rng)?;
            let normalized = normalize_recovery_code(&code)?;
            code_hashes.push(password::hash(&normalized, time_cost)?);
            codes.push(code);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Strip separators and uppercase, so user input matches the stored form.
pub(crate) fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }

    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid recovery code characters"));
    }

    Ok(normalized)
}

/// Format a normalized recovery code for display.
fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_recovery_code(&normalized)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::super::password;
    use super::{format_recovery_code, normalize_recovery_code, RecoveryCodeBatch};

    #[test]
    fn normalize_trims_and_uppercases() {
        let normalized = normalize_recovery_code("abcd-efgh-jklm").unwrap();
        assert_eq!(normalized, "ABCDEFGHJKLM");
        assert!(normalize_recovery_code("abcd-efgh").is_err());
        assert!(normalize_recovery_code("abcd-efgh-jk10").is_err());
    }

    #[test]
    fn format_groups_by_four() {
        let formatted = format_recovery_code("ABCDEFGHJKLM").unwrap();
        assert_eq!(formatted, "ABCD-EFGH-JKLM");
    }

    #[test]
    fn generated_codes_verify_against_their_hashes() {
        let batch = RecoveryCodeBatch::generate(3, 1).unwrap();
        assert_eq!(batch.codes.len(), 3);
        assert_eq!(batch.code_hashes.len(), 3);
        for (code, hash) in batch.codes.iter().zip(&batch.code_hashes) {
            let normalized = normalize_recovery_code(code).unwrap();
            assert!(password::verify(&normalized, hash));
        }
        // Separators are cosmetic; the dashed form itself never matches.
        let first = &batch.codes[0];
        assert!(!password::verify(first, &batch.code_hashes[0]));
    }
}
