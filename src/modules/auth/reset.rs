use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::config::AuthConfig;
use super::credentials::{CredentialRecord, ResetSecretRecord};
use super::errors::AuthError;

const SECRET_BYTES: usize = 32;

/// SHA-256 hex digest of a reset secret; the only form that is persisted
pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.trim().as_bytes()))
}

/// Constant-time comparison of two byte strings
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Issues and redeems single-use password reset secrets
#[derive(Debug, Clone)]
pub struct ResetTokenManager {
    ttl: Duration,
}

impl ResetTokenManager {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            ttl: config.reset_ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a new secret, replacing any outstanding one. The plaintext is
    /// returned once and never stored.
    pub fn create_reset_secret(&self, record: &mut CredentialRecord, now: DateTime<Utc>) -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);

        record.reset_secret = Some(ResetSecretRecord {
            hash: digest(&secret),
            expires_at: now + self.ttl,
        });

        secret
    }

    /// Check `presented` against the outstanding secret and consume it.
    ///
    /// The record is only modified on success; the caller must persist the
    /// cleared secret in the same write as the new password.
    pub fn redeem(
        &self,
        record: &mut CredentialRecord,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let outstanding = record
            .reset_secret
            .as_ref()
            .ok_or(AuthError::ResetSecretMismatch)?;

        if now > outstanding.expires_at {
            return Err(AuthError::ResetSecretExpired);
        }

        if !constant_time_eq(digest(presented).as_bytes(), outstanding.hash.as_bytes()) {
            return Err(AuthError::ResetSecretMismatch);
        }

        record.reset_secret = None;
        Ok(())
    }
}
