use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::config::AuthConfig;
use super::errors::AuthError;
use super::password::{self, validate_password};
use crate::utils::io::is_valid_email;

/// Roles a user account can hold
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => Err(AuthError::InvalidCredentialInput(format!(
                "Unknown role: {}",
                other
            ))),
        }
    }
}

/// Hash and expiry of the outstanding reset secret. Kept as one value so the
/// two are always set and cleared together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResetSecretRecord {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Persisted authentication state of one user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub identity: String,
    pub name: String,
    pub email: String, // lower-cased, unique
    pub role: Role,
    pub password_hash: String,
    pub credential_epoch: Option<DateTime<Utc>>,
    pub reset_secret: Option<ResetSecretRecord>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// False once the account has been deactivated
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True when the password changed after a token issued at `issued_at`
    /// (unix seconds). Epochs are whole seconds, so the comparison is exact.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.credential_epoch
            .map(|epoch| issued_at < epoch.timestamp())
            .unwrap_or(false)
    }
}

/// Sign-up input
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: Role,
}

/// Generate an opaque identity: 16 random bytes as hex
pub fn generate_identity() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Normalise an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Owns password hashing and the credential epoch
#[derive(Debug, Clone)]
pub struct CredentialStore {
    hash_cost: u32,
    epoch_backdate: Duration,
}

impl CredentialStore {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            hash_cost: config.hash_cost,
            epoch_backdate: config.epoch_backdate,
        }
    }

    pub fn hash_password(&self, plaintext: &str) -> Result<String, AuthError> {
        password::hash_password(plaintext, self.hash_cost)
    }

    pub fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        password::verify_password(plaintext, hash, self.hash_cost)
    }

    pub fn is_active(&self, record: &CredentialRecord) -> bool {
        record.is_active()
    }

    /// Build a fresh record for sign-up. The epoch stays empty until the first
    /// password change.
    pub fn create_record(
        &self,
        account: &NewAccount,
        now: DateTime<Utc>,
    ) -> Result<CredentialRecord, AuthError> {
        let name = account.name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidCredentialInput(
                "Please tell us your name".to_string(),
            ));
        }

        let email = normalize_email(&account.email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidCredentialInput(
                "Please provide a valid email".to_string(),
            ));
        }

        validate_password(&account.password, &account.password_confirm)?;

        Ok(CredentialRecord {
            identity: generate_identity(),
            name: name.to_string(),
            email,
            role: account.role,
            password_hash: self.hash_password(&account.password)?,
            credential_epoch: None,
            reset_secret: None,
            active: true,
            created_at: now,
        })
    }

    /// Replace the password and advance the credential epoch, invalidating
    /// every token issued before it.
    pub fn set_password(
        &self,
        record: &mut CredentialRecord,
        new_plaintext: &str,
        confirmation: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        validate_password(new_plaintext, confirmation)?;

        let password_hash = self.hash_password(new_plaintext)?;

        let mut epoch = (now - self.epoch_backdate).trunc_subsecs(0);
        if let Some(previous) = record.credential_epoch {
            if epoch <= previous {
                epoch = previous + Duration::seconds(1);
            }
        }

        record.password_hash = password_hash;
        record.credential_epoch = Some(epoch);
        Ok(())
    }
}
