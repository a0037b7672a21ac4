use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand::Rng;
use std::io;

use super::errors::AuthError;
use crate::{HmacSha256, MIN_PASSWORD_LENGTH};

const SALT_LEN: usize = 16;
const HASH_OUTPUT_LEN: usize = 32;

/// Reasons a new password is refused
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("Please provide a password")]
    Empty,
    #[error("Password must be at least {} characters", MIN_PASSWORD_LENGTH)]
    TooShort,
    #[error("Passwords are not the same")]
    Mismatch,
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        AuthError::InvalidCredentialInput(e.to_string())
    }
}

/// Function to validate a new password and its confirmation
pub fn validate_password(password: &str, confirmation: &str) -> Result<(), PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Empty);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    if password != confirmation {
        return Err(PasswordError::Mismatch);
    }
    Ok(())
}

/// PBKDF2 rounds for a bcrypt-style work factor: 25 * 2^cost.
pub fn rounds_for_cost(cost: u32) -> u32 {
    25u32 << cost
}

/// Hash a password into a PHC string with a fresh random salt
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, AuthError> {
    if plaintext.is_empty() {
        return Err(PasswordError::Empty.into());
    }

    let salt_bytes: [u8; SALT_LEN] = rand::thread_rng().gen();
    let salt = SaltString::b64_encode(&salt_bytes)
        .map_err(|e| AuthError::Config(format!("failed to encode salt: {}", e)))?;

    let params = Params {
        rounds: rounds_for_cost(cost),
        output_length: HASH_OUTPUT_LEN,
    };

    let hash = Pbkdf2
        .hash_password_customized(plaintext.as_bytes(), None, None, params, &salt)
        .map_err(|e| AuthError::Config(format!("password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// A hash that cannot be parsed still costs one derivation at `fallback_cost`
/// so it answers in about the same time as a wrong password.
pub fn verify_password(plaintext: &str, hash: &str, fallback_cost: u32) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Pbkdf2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => {
            let mut sink = [0u8; HASH_OUTPUT_LEN];
            pbkdf2::pbkdf2::<HmacSha256>(
                plaintext.as_bytes(),
                &[0u8; SALT_LEN],
                rounds_for_cost(fallback_cost),
                &mut sink,
            );
            false
        }
    }
}

/// Helper function to read a password securely
pub fn read_password() -> io::Result<String> {
    rpassword::read_password()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    #[test]
    fn test_password_validation() {
        assert!(validate_password("pass1234", "pass1234").is_ok());

        assert!(matches!(
            validate_password("", ""),
            Err(PasswordError::Empty)
        ));
        assert!(matches!(
            validate_password("short", "short"),
            Err(PasswordError::TooShort)
        ));
        assert!(matches!(
            validate_password("pass1234", "pass12345"),
            Err(PasswordError::Mismatch)
        ));
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse", COST).unwrap();
        assert!(hash.starts_with("$pbkdf2-sha256$"));
        assert!(!hash.contains("correct horse"));

        assert!(verify_password("correct horse", &hash, COST));
        assert!(!verify_password("battery staple", &hash, COST));
        assert!(!verify_password("", &hash, COST));
    }

    #[test]
    fn test_distinct_salts() {
        let hash1 = hash_password("same password", COST).unwrap();
        let hash2 = hash_password("same password", COST).unwrap();
        assert_ne!(hash1, hash2);
        assert!(verify_password("same password", &hash1, COST));
        assert!(verify_password("same password", &hash2, COST));
    }

    #[test]
    fn test_cost_is_read_from_hash() {
        let hash = hash_password("password one", 5).unwrap();
        assert!(hash.contains(&format!("i={}", rounds_for_cost(5))));
        // Verification does not depend on the caller's current cost
        assert!(verify_password("password one", &hash, COST));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            hash_password("", COST),
            Err(AuthError::InvalidCredentialInput(_))
        ));
    }

    #[test]
    fn test_unknown_hash_format() {
        assert!(!verify_password("anything", "not-a-phc-string", COST));
        assert!(!verify_password("anything", "", COST));
    }

    #[test]
    fn test_rounds_for_cost() {
        assert_eq!(rounds_for_cost(12), 102_400);
        assert_eq!(rounds_for_cost(4), 400);
    }
}
