use chrono::Duration;
use std::env;
use std::fmt;

use super::errors::AuthError;
use crate::{
    DEFAULT_COOKIE_TTL_DAYS, DEFAULT_HASH_COST, DEFAULT_TOKEN_TTL_DAYS, EPOCH_BACKDATE_SECS,
    RESET_SECRET_TTL_SECS,
};

/// Shortest HMAC key accepted for signing session tokens.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Longest accepted token or cookie lifetime.
pub const MAX_LIFETIME_DAYS: i64 = 3650;

/// Accepted range for the bcrypt-style work factor.
pub const HASH_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=20;

/// Secret key used to sign session tokens. Never printed.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SIGNING_KEY_LEN {
            return Err(AuthError::Config(format!(
                "signing key must be at least {} bytes",
                MIN_SIGNING_KEY_LEN
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

/// Settings for the credential subsystem, handed to each component at
/// construction instead of being read from the environment at use sites.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_key: SigningKey,
    /// Lifetime of a session token
    pub token_ttl: Duration,
    /// Lifetime of the session cookie carrying the token
    pub cookie_ttl: Duration,
    /// bcrypt-style work factor; PBKDF2 rounds grow as 2^cost
    pub hash_cost: u32,
    /// How far the credential epoch is moved back on password change
    pub epoch_backdate: Duration,
    /// Lifetime of an outstanding reset secret
    pub reset_ttl: Duration,
    /// Mark cookies `Secure` (production)
    pub secure_cookies: bool,
}

impl AuthConfig {
    /// Configuration with default lifetimes and cost around the given key.
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        Ok(Self {
            signing_key: SigningKey::new(signing_key)?,
            token_ttl: Duration::days(DEFAULT_TOKEN_TTL_DAYS),
            cookie_ttl: Duration::days(DEFAULT_COOKIE_TTL_DAYS),
            hash_cost: DEFAULT_HASH_COST,
            epoch_backdate: Duration::seconds(EPOCH_BACKDATE_SECS),
            reset_ttl: Duration::seconds(RESET_SECRET_TTL_SECS),
            secure_cookies: false,
        })
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Result<Self, AuthError> {
        if !HASH_COST_RANGE.contains(&cost) {
            return Err(AuthError::Config(format!(
                "hash cost {} outside {}..={}",
                cost,
                HASH_COST_RANGE.start(),
                HASH_COST_RANGE.end()
            )));
        }
        self.hash_cost = cost;
        Ok(self)
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Result<Self, AuthError> {
        self.token_ttl = checked_lifetime("token lifetime", ttl)?;
        Ok(self)
    }

    pub fn with_cookie_ttl(mut self, ttl: Duration) -> Result<Self, AuthError> {
        self.cookie_ttl = checked_lifetime("cookie lifetime", ttl)?;
        Ok(self)
    }

    /// Load configuration from environment variables (and a `.env` file if present)
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET")
            .ok_or_else(|| AuthError::Config("missing environment variable JWT_SECRET".into()))?;

        let mut config = Self::new(secret.into_bytes())?;

        if let Some(days) = parse_var::<i64>(&lookup, "JWT_EXPIRES_IN_DAYS")? {
            config = config.with_token_ttl(lifetime_days("JWT_EXPIRES_IN_DAYS", days)?)?;
        }
        if let Some(days) = parse_var::<i64>(&lookup, "JWT_COOKIE_EXPIRES_IN_DAYS")? {
            config = config.with_cookie_ttl(lifetime_days("JWT_COOKIE_EXPIRES_IN_DAYS", days)?)?;
        }
        if let Some(cost) = parse_var::<u32>(&lookup, "PASSWORD_HASH_COST")? {
            config = config.with_hash_cost(cost)?;
        }

        config.secure_cookies = is_production(&lookup);

        Ok(config)
    }
}

/// True when `APP_ENV` (or `NODE_ENV`) names the production environment
pub fn is_production<F: Fn(&str) -> Option<String>>(lookup: &F) -> bool {
    lookup("APP_ENV")
        .or_else(|| lookup("NODE_ENV"))
        .map(|environment| environment.trim().eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

fn lifetime_days(name: &str, days: i64) -> Result<Duration, AuthError> {
    if !(1..=MAX_LIFETIME_DAYS).contains(&days) {
        return Err(AuthError::Config(format!(
            "{} must be between 1 and {} days, got {}",
            name, MAX_LIFETIME_DAYS, days
        )));
    }
    Duration::try_days(days)
        .ok_or_else(|| AuthError::Config(format!("{} out of range: {}", name, days)))
}

fn checked_lifetime(name: &str, ttl: Duration) -> Result<Duration, AuthError> {
    if ttl <= Duration::zero() || ttl > Duration::days(MAX_LIFETIME_DAYS) {
        return Err(AuthError::Config(format!(
            "{} must be positive and at most {} days",
            name, MAX_LIFETIME_DAYS
        )));
    }
    Ok(ttl)
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, AuthError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AuthError::Config(format!("invalid value for {}: {}", name, raw))),
        None => Ok(None),
    }
}
