//! Credential hashing and constant-time verification.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;

/// SHA-256 of the password as lowercase hex. Used both as the stored
/// form of pre-hashed secrets and as the session-cookie value (where it
/// obfuscates rather than protects, and conveniently needs no escaping).
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        // Writing into a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Constant-time equality over the full contents. Comparison time does
/// not depend on where the strings first differ.
pub fn safe_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check a submitted password against the configured credential. A
/// pre-hashed secret wins over a plaintext one when both are present.
pub fn verify_password(config: &AuthConfig, submitted: &str) -> bool {
    if let Some(hashed) = &config.hashed_password {
        return safe_compare(&hash_password(submitted), hashed);
    }
    match &config.password {
        Some(password) => safe_compare(submitted, password),
        None => false,
    }
}
