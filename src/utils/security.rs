//! Security Utilities
//!
//! Secret generation, password hashing, and timing-safe comparison.

use base64::prelude::*;
use bcrypt::{hash, verify, DEFAULT_COST};
use rand::{rngs::OsRng, Rng, RngCore};

/// Default bcrypt cost for password hashing
pub const DEFAULT_BCRYPT_COST: u32 = DEFAULT_COST;

/// Number of random bytes behind every OAuth state token
pub const STATE_TOKEN_BYTES: usize = 32;

/// Source of the ephemeral secrets handed out by the service
///
/// Production code uses [`OsSecretGenerator`]; tests substitute a fixed
/// generator so that issued codes are predictable.
pub trait SecretGenerator: Send + Sync {
    /// Produce a numeric one-time passcode with exactly `digits` ASCII digits
    fn otp_code(&self, digits: usize) -> String;

    /// Produce an unguessable, URL-safe OAuth state token
    fn state_token(&self) -> String;
}

/// Secret generator backed by the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecretGenerator;

impl SecretGenerator for OsSecretGenerator {
    fn otp_code(&self, digits: usize) -> String {
        generate_otp_code(digits)
    }

    fn state_token(&self) -> String {
        generate_state_token()
    }
}

/// Generate a numeric OTP code, zero-padded, drawing each digit from the OS RNG
pub fn generate_otp_code(digits: usize) -> String {
    (0..digits)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}

/// Generate a state token for OAuth flows (32 random bytes, base64url without padding)
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a password with custom bcrypt cost
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// Create a secure hash of sensitive data for storage
pub fn hash_sensitive_data(data: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Timing-safe string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_otp_code() {
        for _ in 0..50 {
            let otp = generate_otp_code(6);
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_otp_code_custom_length() {
        assert_eq!(generate_otp_code(8).len(), 8);
    }

    #[test]
    fn test_generate_state_token() {
        let token1 = generate_state_token();
        let token2 = generate_state_token();

        // 32 bytes -> 43 base64url characters without padding
        assert_eq!(token1.len(), 43);
        assert_ne!(token1, token2);
        assert!(token1
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_os_secret_generator() {
        let generator = OsSecretGenerator;
        assert_eq!(generator.otp_code(6).len(), 6);
        assert_eq!(generator.state_token().len(), 43);
    }

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hash = hash_password_with_cost(password, 4).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("123456", "123456"));
        assert!(!constant_time_compare("123456", "999999"));
        assert!(!constant_time_compare("123456", "1234567"));
    }

    #[test]
    fn test_hash_sensitive_data() {
        let data = "sensitive_data";
        let hash1 = hash_sensitive_data(data);
        let hash2 = hash_sensitive_data(data);

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
