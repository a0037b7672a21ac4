use chrono::{DateTime, Duration, Utc};
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::config::AuthConfig;
use super::cookie::{logout_cookie, session_cookie};
use super::credentials::{CredentialRecord, CredentialStore, NewAccount, Role};
use super::errors::AuthError;
use super::gate::{restrict_to, AuthGate, GateOutcome, Principal, RequestCredentials};
use super::reset::{self, ResetTokenManager};
use super::store::{CredentialRepository, RecordScope};
use super::tokens::TokenIssuer;
use crate::email::{password_reset_email, welcome_email, Mailer};
use crate::utils::logging::log_auth_event;

const PRUNE_LOCKS_ABOVE: usize = 1024;

/// A freshly issued session: the bearer token and the cookie carrying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
    pub token: String,
    pub set_cookie: String,
}

/// One mutex per identity so writes to the same account never interleave
#[derive(Default)]
struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    fn handle(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        if locks.len() > PRUNE_LOCKS_ABOVE {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Controller-facing entry point for every credential operation
pub struct AuthService<R: CredentialRepository, M: Mailer> {
    repository: R,
    mailer: M,
    credentials: CredentialStore,
    gate: AuthGate,
    resets: ResetTokenManager,
    cookie_ttl: Duration,
    secure_cookies: bool,
    locks: IdentityLocks,
}

impl<R: CredentialRepository, M: Mailer> AuthService<R, M> {
    pub fn new(config: &AuthConfig, repository: R, mailer: M) -> Self {
        Self {
            repository,
            mailer,
            credentials: CredentialStore::new(config),
            gate: AuthGate::new(TokenIssuer::new(config)),
            resets: ResetTokenManager::new(config),
            cookie_ttl: config.cookie_ttl,
            secure_cookies: config.secure_cookies,
            locks: IdentityLocks::default(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    fn start_session(&self, record: &CredentialRecord, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let token = self.gate.issuer().issue(&record.identity, now)?;
        let set_cookie = session_cookie(&token, now, self.cookie_ttl, self.secure_cookies)?;
        Ok(Session {
            principal: Principal {
                identity: record.identity.clone(),
                role: record.role,
            },
            token,
            set_cookie,
        })
    }

    fn load_active(&self, identity: &str) -> Result<CredentialRecord, AuthError> {
        self.repository
            .load(identity, RecordScope::ActiveOnly)?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Create an account and log it in. A failed welcome email is logged but
    /// does not undo the sign-up.
    pub fn signup(
        &self,
        account: &NewAccount,
        welcome_url: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let record = self.credentials.create_record(account, now)?;
        self.repository.insert(record.clone())?;
        log_auth_event("signup", &record.email, true, None);

        let email = welcome_email(&record.email, &record.name, welcome_url);
        if let Err(e) = self.mailer.send(&email) {
            warn!("Welcome email not delivered: {}", e);
        }

        self.start_session(&record, now)
    }

    /// Check email and password and issue a session token
    pub fn login(&self, email: &str, password: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentialInput(
                "Please provide email and password".to_string(),
            ));
        }

        let record = self.repository.find_by_email(email, RecordScope::ActiveOnly)?;
        let verified = match &record {
            Some(record) => self.credentials.verify_password(password, &record.password_hash),
            None => {
                // Same hashing work as a real comparison
                self.credentials.verify_password(password, "");
                false
            }
        };

        match record {
            Some(record) if verified => {
                log_auth_event("login", &record.email, true, None);
                self.start_session(&record, now)
            }
            _ => {
                log_auth_event("login", email, false, Some("incorrect email or password"));
                Err(AuthError::WrongPassword)
            }
        }
    }

    /// Gate decision for an incoming request
    pub fn authenticate(
        &self,
        request: &RequestCredentials<'_>,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, AuthError> {
        self.gate.authenticate(&self.repository, request, now)
    }

    /// Capability check for role-restricted operations
    pub fn restrict_to(&self, principal: &Principal, roles: &[Role]) -> Result<(), AuthError> {
        restrict_to(principal, roles)
    }

    /// Change the password of a logged-in user. Every earlier token stops
    /// working; the returned session keeps the caller logged in.
    pub fn change_password(
        &self,
        identity: &str,
        current: &str,
        new_password: &str,
        confirmation: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let lock = self.locks.handle(identity);
        let _guard = lock.lock();

        let mut record = self.load_active(identity)?;
        if !self.credentials.verify_password(current, &record.password_hash) {
            log_auth_event("change_password", &record.email, false, Some("wrong current password"));
            return Err(AuthError::WrongPassword);
        }

        self.credentials
            .set_password(&mut record, new_password, confirmation, now)?;
        self.repository.save(&record)?;
        log_auth_event("change_password", &record.email, true, None);

        self.start_session(&record, now)
    }

    /// Issue a reset secret and mail a link containing it to the account.
    ///
    /// If delivery fails the error is returned but the stored secret stays
    /// valid until it expires.
    pub fn forgot_password(
        &self,
        email: &str,
        reset_base_url: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let identity = self
            .repository
            .find_by_email(email, RecordScope::ActiveOnly)?
            .ok_or(AuthError::NoSuchAccount)?
            .identity;

        let lock = self.locks.handle(&identity);
        let secret = {
            let _guard = lock.lock();
            let mut record = self.load_active(&identity).map_err(|_| AuthError::NoSuchAccount)?;
            let secret = self.resets.create_reset_secret(&mut record, now);
            self.repository.save(&record)?;

            let reset_url = format!("{}/{}", reset_base_url.trim_end_matches('/'), secret);
            let message =
                password_reset_email(&record.email, &record.name, &reset_url, self.resets.ttl());
            if let Err(e) = self.mailer.send(&message) {
                log_auth_event("forgot_password", &record.email, false, Some("email delivery failed"));
                return Err(e.into());
            }
            log_auth_event("forgot_password", &record.email, true, None);
            secret
        };

        Ok(secret)
    }

    /// Redeem a reset secret and set a new password in one write
    pub fn reset_password(
        &self,
        secret: &str,
        new_password: &str,
        confirmation: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let digest = reset::digest(secret);
        let identity = self
            .repository
            .find_by_reset_digest(&digest, RecordScope::ActiveOnly)?
            .ok_or(AuthError::ResetSecretMismatch)?
            .identity;

        let lock = self.locks.handle(&identity);
        let _guard = lock.lock();

        // Re-read under the lock: a concurrent redemption may have won
        let mut record = self
            .repository
            .load(&identity, RecordScope::ActiveOnly)?
            .ok_or(AuthError::ResetSecretMismatch)?;

        if let Err(e) = self.resets.redeem(&mut record, secret, now) {
            log_auth_event("reset_password", &record.email, false, Some(&e.to_string()));
            return Err(e);
        }
        self.credentials
            .set_password(&mut record, new_password, confirmation, now)?;
        self.repository.save(&record)?;
        log_auth_event("reset_password", &record.email, true, None);

        self.start_session(&record, now)
    }

    /// Soft-delete an account. Its tokens stop working immediately.
    pub fn deactivate(&self, identity: &str) -> Result<(), AuthError> {
        let lock = self.locks.handle(identity);
        let _guard = lock.lock();

        let mut record = self.load_active(identity)?;
        record.active = false;
        self.repository.save(&record)?;
        log_auth_event("deactivate", &record.email, true, None);
        Ok(())
    }

    /// Cookie that replaces the session token on logout
    pub fn logout(&self, now: DateTime<Utc>) -> String {
        logout_cookie(now)
    }
}
