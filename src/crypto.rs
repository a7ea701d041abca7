//! Random values and hashing helpers built on `ring`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{constant_time, digest};

use crate::error::AuthError;

/// Returns `len` bytes from the system CSPRNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, AuthError> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AuthError::Configuration("system random source unavailable".into()))?;
    Ok(buf)
}

/// Anti-CSRF `state` value: 32 random bytes, base64url without padding.
pub fn random_state() -> Result<String, AuthError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(32)?))
}

/// PKCE code verifier (43 characters, within the RFC 7636 43..128 range).
pub fn pkce_code_verifier() -> Result<String, AuthError> {
    random_state()
}

/// Generate a PKCE code challenge from the given verifier using SHA-256 and base64url (no padding).
pub fn pkce_code_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

/// Compares two secrets without leaking the position of the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time::verify_slices_are_equal(a, b).is_ok()
}
