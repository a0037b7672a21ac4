use chrono::{DateTime, Utc};
use log::debug;

use super::cookie::session_token_from_cookie_header;
use super::credentials::Role;
use super::errors::{AuthError, LOGIN_AGAIN_MESSAGE};
use super::store::{CredentialRepository, RecordScope};
use super::tokens::TokenIssuer;

/// The parts of an incoming request that may carry a bearer token
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCredentials<'a> {
    pub authorization: Option<&'a str>,
    pub cookie_header: Option<&'a str>,
}

impl<'a> RequestCredentials<'a> {
    pub fn from_authorization(value: &'a str) -> Self {
        Self {
            authorization: Some(value),
            cookie_header: None,
        }
    }

    pub fn from_cookie_header(value: &'a str) -> Self {
        Self {
            authorization: None,
            cookie_header: Some(value),
        }
    }

    /// Token from `Authorization: Bearer`, falling back to the session cookie
    pub fn bearer_token(&self) -> Option<&'a str> {
        let from_header = self
            .authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        from_header.or_else(|| self.cookie_header.and_then(session_token_from_cookie_header))
    }
}

/// Identity attached to a request after the gate lets it through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
}

/// Why the gate refused a request. Callers show the same message for all of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unauthenticated,
    InvalidToken,
    StaleToken,
}

impl RejectReason {
    pub fn public_message(&self) -> &'static str {
        LOGIN_AGAIN_MESSAGE
    }

    pub fn into_error(self) -> AuthError {
        match self {
            RejectReason::Unauthenticated | RejectReason::InvalidToken => {
                AuthError::Unauthenticated
            }
            RejectReason::StaleToken => AuthError::StaleToken,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Verified(Principal),
    Rejected(RejectReason),
}

impl GateOutcome {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            GateOutcome::Verified(principal) => Some(principal),
            GateOutcome::Rejected(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Principal, AuthError> {
        match self {
            GateOutcome::Verified(principal) => Ok(principal),
            GateOutcome::Rejected(reason) => Err(reason.into_error()),
        }
    }
}

/// Request-time authentication decision
#[derive(Debug, Clone)]
pub struct AuthGate {
    issuer: TokenIssuer,
}

impl AuthGate {
    pub fn new(issuer: TokenIssuer) -> Self {
        Self { issuer }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Decide whether the request is authenticated. Only storage failures
    /// surface as `Err`.
    pub fn authenticate<R: CredentialRepository + ?Sized>(
        &self,
        repository: &R,
        request: &RequestCredentials<'_>,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, AuthError> {
        let Some(token) = request.bearer_token() else {
            return Ok(GateOutcome::Rejected(RejectReason::Unauthenticated));
        };

        let verified = match self.issuer.verify(token, now) {
            Ok(verified) => verified,
            Err(e) => {
                debug!("Rejected token: {}", e);
                return Ok(GateOutcome::Rejected(RejectReason::InvalidToken));
            }
        };

        // Deleted and never-existing identities look the same from here
        let Some(record) = repository.load(&verified.identity, RecordScope::ActiveOnly)? else {
            return Ok(GateOutcome::Rejected(RejectReason::Unauthenticated));
        };

        if record.changed_password_after(verified.issued_at) {
            debug!("Rejected token issued before the last password change");
            return Ok(GateOutcome::Rejected(RejectReason::StaleToken));
        }

        Ok(GateOutcome::Verified(Principal {
            identity: record.identity,
            role: record.role,
        }))
    }
}

/// Capability check: the principal's role must be one of `roles`
pub fn restrict_to(principal: &Principal, roles: &[Role]) -> Result<(), AuthError> {
    if roles.contains(&principal.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::AuthConfig;
    use crate::auth::credentials::CredentialRecord;
    use crate::auth::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn gate() -> AuthGate {
        let config = AuthConfig::new(b"gate-test-key-0123456789abcdefghij".to_vec()).unwrap();
        AuthGate::new(TokenIssuer::new(&config))
    }

    fn store_with(record: CredentialRecord) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(record).unwrap();
        store
    }

    fn record() -> CredentialRecord {
        CredentialRecord {
            identity: "user-1".to_string(),
            name: "Guide".to_string(),
            email: "guide@example.com".to_string(),
            role: Role::Guide,
            password_hash: "$pbkdf2-sha256$unused".to_string(),
            credential_epoch: None,
            reset_secret: None,
            active: true,
            created_at: at(0),
        }
    }

    #[test]
    fn test_bearer_token_sources() {
        assert_eq!(
            RequestCredentials::from_authorization("Bearer abc").bearer_token(),
            Some("abc")
        );
        assert_eq!(
            RequestCredentials::from_authorization("Basic abc").bearer_token(),
            None
        );
        assert_eq!(
            RequestCredentials::from_authorization("Bearer   ").bearer_token(),
            None
        );
        assert_eq!(
            RequestCredentials::from_cookie_header("jwt=xyz").bearer_token(),
            Some("xyz")
        );

        let both = RequestCredentials {
            authorization: Some("Bearer from-header"),
            cookie_header: Some("jwt=from-cookie"),
        };
        assert_eq!(both.bearer_token(), Some("from-header"));

        let bad_header = RequestCredentials {
            authorization: Some("Token nope"),
            cookie_header: Some("jwt=from-cookie"),
        };
        assert_eq!(bad_header.bearer_token(), Some("from-cookie"));
    }

    #[test]
    fn test_no_token() {
        let store = store_with(record());
        let outcome = gate()
            .authenticate(&store, &RequestCredentials::default(), at(10))
            .unwrap();
        assert_eq!(outcome, GateOutcome::Rejected(RejectReason::Unauthenticated));
    }

    #[test]
    fn test_verified_via_header_and_cookie() {
        let gate = gate();
        let store = store_with(record());
        let token = gate.issuer().issue("user-1", at(10)).unwrap();

        let header = format!("Bearer {}", token);
        let via_header = gate
            .authenticate(&store, &RequestCredentials::from_authorization(&header), at(20))
            .unwrap();
        let cookie = format!("jwt={}", token);
        let via_cookie = gate
            .authenticate(&store, &RequestCredentials::from_cookie_header(&cookie), at(20))
            .unwrap();

        let expected = GateOutcome::Verified(Principal {
            identity: "user-1".to_string(),
            role: Role::Guide,
        });
        assert_eq!(via_header, expected);
        assert_eq!(via_cookie, expected);
    }

    #[test]
    fn test_invalid_token_collapsed() {
        let gate = gate();
        let store = store_with(record());

        let garbage = gate
            .authenticate(&store, &RequestCredentials::from_cookie_header("jwt=loggedout"), at(20))
            .unwrap();
        assert_eq!(garbage, GateOutcome::Rejected(RejectReason::InvalidToken));

        let token = gate.issuer().issue("user-1", at(10)).unwrap();
        let header = format!("Bearer {}", token);
        let expired_at = at(10) + gate.issuer().ttl();
        let expired = gate
            .authenticate(&store, &RequestCredentials::from_authorization(&header), expired_at)
            .unwrap();
        assert_eq!(expired, GateOutcome::Rejected(RejectReason::InvalidToken));
    }

    #[test]
    fn test_missing_and_inactive_identity_look_alike() {
        let gate = gate();
        let mut inactive = record();
        inactive.active = false;
        let store = store_with(inactive);

        let deleted = gate.issuer().issue("user-1", at(10)).unwrap();
        let unknown = gate.issuer().issue("user-2", at(10)).unwrap();

        for token in [deleted, unknown] {
            let header = format!("Bearer {}", token);
            let outcome = gate
                .authenticate(&store, &RequestCredentials::from_authorization(&header), at(20))
                .unwrap();
            assert_eq!(outcome, GateOutcome::Rejected(RejectReason::Unauthenticated));
        }
    }

    #[test]
    fn test_stale_token() {
        let gate = gate();
        let mut changed = record();
        changed.credential_epoch = Some(at(100));
        let store = store_with(changed);

        let old = gate.issuer().issue("user-1", at(99)).unwrap();
        let header = format!("Bearer {}", old);
        let outcome = gate
            .authenticate(&store, &RequestCredentials::from_authorization(&header), at(200))
            .unwrap();
        assert_eq!(outcome, GateOutcome::Rejected(RejectReason::StaleToken));

        let fresh = gate
            .issuer()
            .issue("user-1", at(100) + Duration::milliseconds(500))
            .unwrap();
        let header = format!("Bearer {}", fresh);
        let outcome = gate
            .authenticate(&store, &RequestCredentials::from_authorization(&header), at(200))
            .unwrap();
        assert!(outcome.principal().is_some());
    }

    #[test]
    fn test_rejections_share_message() {
        for reason in [
            RejectReason::Unauthenticated,
            RejectReason::InvalidToken,
            RejectReason::StaleToken,
        ] {
            assert_eq!(reason.public_message(), LOGIN_AGAIN_MESSAGE);
            assert_eq!(reason.into_error().public_message(), LOGIN_AGAIN_MESSAGE);
        }
    }

    #[test]
    fn test_restrict_to() {
        let principal = Principal {
            identity: "user-1".to_string(),
            role: Role::Guide,
        };
        assert!(restrict_to(&principal, &[Role::Admin, Role::Guide]).is_ok());
        assert_eq!(
            restrict_to(&principal, &[Role::Admin, Role::LeadGuide]),
            Err(AuthError::Forbidden)
        );
        assert_eq!(restrict_to(&principal, &[]), Err(AuthError::Forbidden));
    }
}
