//! Credential primitives: password hashing, session tokens and verification codes.
//!
//! Passwords are hashed with Argon2id. Session tokens and verification codes
//! are random values that are only ever stored as SHA-256 hex digests.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of digits in an emailed verification code
pub const OTP_DIGITS: usize = 6;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random session token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token or code for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a zero-padded numeric verification code
pub fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(0..10u32.pow(OTP_DIGITS as u32));
    format!("{:0width$}", code, width = OTP_DIGITS)
}

/// Compare a submitted code with its stored digest in constant time
pub fn otp_matches(submitted: &str, stored_hash: &str) -> bool {
    let candidate = hash_token(submitted.trim());
    candidate.len() == stored_hash.len()
        && bool::from(candidate.as_bytes().ct_eq(stored_hash.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse 42").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse 42", &hash));
        assert!(!verify_password("wrong horse 42", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_otp_format() {
        for _ in 0..50 {
            let code = generate_otp();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_otp_matches_stored_digest() {
        let stored = hash_token("042917");
        assert!(otp_matches("042917", &stored));
        assert!(otp_matches(" 042917 ", &stored));
        assert!(!otp_matches("042918", &stored));
        assert!(!otp_matches("", &stored));
    }
}
