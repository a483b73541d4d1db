//! TOTP primitives, backup code generation, and AES-256-GCM secret
//! encryption.
//!
//! Secrets travel as unpadded RFC 4648 base32. Codes are 6-digit SHA1
//! (RFC 6238 defaults) with a configurable step length.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::rand_core::RngCore as _;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

const DIGITS: usize = 6;
const BACKUP_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Everything a client needs to enroll an authenticator app.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetup {
    /// Base32 secret.
    pub secret: String,
    /// `otpauth://totp/...` provisioning URI.
    pub uri: String,
    /// `data:image/png;base64,...` QR code of `uri`.
    pub qr_code_image: String,
    pub backup_codes: Vec<String>,
}

/// Fresh random secret of `key_length` bytes, base32-encoded.
pub fn generate_secret(key_length: usize) -> String {
    let mut bytes = vec![0u8; key_length];
    rand::rng().fill_bytes(&mut bytes);
    Secret::Raw(bytes).to_encoded().to_string()
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, AuthError> {
    Secret::Encoded(secret.trim().to_uppercase())
        .to_bytes()
        .map_err(|e| AuthError::InvalidSecret(format!("{e:?}")))
}

fn build_totp(
    secret: &str,
    step: u64,
    skew: u8,
    issuer: Option<&str>,
    account: &str,
) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        skew,
        step,
        decode_secret(secret)?,
        issuer.map(str::to_string),
        account.to_string(),
    )
    .map_err(|e| AuthError::InvalidSecret(format!("TOTP init: {e}")))
}

/// Provisioning URI and QR data URI for `secret`.
pub fn provisioning(
    secret: &str,
    step: u64,
    issuer: &str,
    account: &str,
) -> Result<(String, String), AuthError> {
    let totp = build_totp(secret, step, 1, Some(issuer), account)?;
    let qr = totp
        .get_qr_base64()
        .map_err(|e| AuthError::Provisioning(format!("QR render: {e}")))?;
    Ok((totp.get_url(), format!("data:image/png;base64,{qr}")))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Check `token` against `secret` at the current time, allowing `window`
/// steps of drift either way. A malformed secret is a mismatch.
pub fn verify_totp_code(secret: &str, token: &str, window: u8, step: u64) -> bool {
    verify_totp_code_at(secret, token, window, step, unix_now())
}

/// [`verify_totp_code`] at an explicit Unix time.
pub fn verify_totp_code_at(secret: &str, token: &str, window: u8, step: u64, time: u64) -> bool {
    let token = token.trim();
    if token.len() != DIGITS || !token.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match build_totp(secret, step, window, None, "verify") {
        Ok(totp) => totp.check(token, time),
        Err(_) => false,
    }
}

/// The code for `secret` at an explicit Unix time.
pub fn generate_code_at(secret: &str, step: u64, time: u64) -> Result<String, AuthError> {
    Ok(build_totp(secret, step, 0, None, "generate")?.generate(time))
}

/// Whether `count` distinct codes of `length` characters exist at all.
pub fn backup_codes_fit(count: usize, length: usize) -> bool {
    let Ok(length) = u32::try_from(length) else {
        return true;
    };
    match 36u64.checked_pow(length) {
        Some(space) => u64::try_from(count).is_ok_and(|count| count <= space),
        None => true,
    }
}

/// `count` distinct uppercase alphanumeric codes of `length` characters.
///
/// Each character is one CSPRNG byte reduced modulo 36. Callers must check
/// [`backup_codes_fit`] first; an impossible batch never completes.
pub fn generate_backup_codes(count: usize, length: usize) -> Vec<String> {
    let mut rng = rand::rng();
    let mut seen = HashSet::with_capacity(count);
    let mut codes = Vec::with_capacity(count);
    let mut buf = vec![0u8; length];

    while codes.len() < count {
        rng.fill_bytes(&mut buf);
        let code: String = buf
            .iter()
            .map(|b| BACKUP_ALPHABET[(*b % 36) as usize] as char)
            .collect();
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    codes
}

/// Encrypt a TOTP secret with AES-256-GCM.
///
/// Returns `base64(nonce || ciphertext || tag)`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

/// Decrypt an AES-256-GCM encrypted TOTP secret.
pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() < 13 {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    #[test]
    fn secret_has_requested_size() {
        let secret = generate_secret(32);
        assert_eq!(decode_secret(&secret).unwrap().len(), 32);
        assert_ne!(secret, generate_secret(32));
    }

    #[test]
    fn current_step_code_passes_with_zero_window() {
        let secret = generate_secret(32);
        let code = generate_code_at(&secret, 30, T0).unwrap();
        assert!(verify_totp_code_at(&secret, &code, 0, 30, T0));
    }

    #[test]
    fn adjacent_steps_pass_with_window() {
        let secret = generate_secret(32);
        let previous = generate_code_at(&secret, 30, T0 - 30).unwrap();
        assert!(verify_totp_code_at(&secret, &previous, 1, 30, T0));
        let next = generate_code_at(&secret, 30, T0 + 30).unwrap();
        assert!(verify_totp_code_at(&secret, &next, 1, 30, T0));
    }

    #[test]
    fn stale_code_fails() {
        let secret = generate_secret(32);
        let stale = generate_code_at(&secret, 30, T0 - 31 * 30).unwrap();
        let nearby: Vec<String> = [T0 - 30, T0, T0 + 30]
            .iter()
            .map(|t| generate_code_at(&secret, 30, *t).unwrap())
            .collect();
        // Skip the one-in-a-million digit collision with an accepted step.
        if !nearby.contains(&stale) {
            assert!(!verify_totp_code_at(&secret, &stale, 1, 30, T0));
        }
    }

    #[test]
    fn malformed_input_is_false() {
        let secret = generate_secret(32);
        assert!(!verify_totp_code_at("not base32 !!", "123456", 1, 30, T0));
        assert!(!verify_totp_code_at(&secret, "12345", 1, 30, T0));
        assert!(!verify_totp_code_at(&secret, "abcdef", 1, 30, T0));
        // Short secrets are rejected by the TOTP constructor.
        let short = Secret::Raw(vec![1u8; 8]).to_encoded().to_string();
        assert!(!verify_totp_code_at(&short, "123456", 1, 30, T0));
    }

    #[test]
    fn provisioning_uri_and_qr() {
        let secret = generate_secret(32);
        let (uri, qr) = provisioning(&secret, 30, "Bastion", "alice@example.com").unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Bastion"));
        assert!(uri.contains("alice"));
        assert!(uri.contains(&secret));
        assert!(qr.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn backup_codes_shape() {
        let codes = generate_backup_codes(10, 8);
        assert_eq!(codes.len(), 10);
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()));
        }
    }

    #[test]
    fn backup_code_space_is_bounded() {
        assert!(backup_codes_fit(36, 1));
        assert!(!backup_codes_fit(37, 1));
        assert!(backup_codes_fit(1296, 2));
        assert!(!backup_codes_fit(1297, 2));
        assert!(backup_codes_fit(10, 8));
        assert!(backup_codes_fit(usize::MAX, 64));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let plaintext = b"totp-secret-bytes";
        let encrypted = encrypt_secret(&key, plaintext).unwrap();
        let decrypted = decrypt_secret(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let encrypted = encrypt_secret(&[42u8; 32], b"secret").unwrap();
        assert!(decrypt_secret(&[99u8; 32], &encrypted).is_err());
    }
}
