use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::Mac;
use serde::{Deserialize, Serialize};

use super::config::{AuthConfig, SigningKey};
use super::errors::AuthError;
use crate::HmacSha256;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Claims carried by a session token. Times are unix seconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

/// What a successfully verified token proves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub identity: String,
    pub issued_at: i64,
}

/// Mints and checks stateless session tokens in compact JWS form:
/// base64url(header).base64url(claims).base64url(HMAC-SHA256 tag)
///
/// Holds only the read-only signing key, so one issuer can be shared across
/// any number of threads.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: SigningKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: config.signing_key.clone(),
            ttl: config.token_ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `identity` valid from `now` until `now + ttl`
    pub fn issue(&self, identity: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        if self.ttl <= Duration::zero() {
            return Err(AuthError::Config("token lifetime must be positive".into()));
        }
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::Config("token lifetime out of range".into()))?;
        let claims = TokenClaims {
            id: identity.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let h = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let p = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{}.{}", h, p);
        let tag = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes())?);

        Ok(format!("{}.{}", signing_input, tag))
    }

    /// Verify structure, then the tag, then expiry. No claim is read before
    /// the tag has been checked.
    ///
    /// `iat` and `exp` are whole unix seconds and the encoded `iat` counts as
    /// the issue time. A token minted at a fractional instant T therefore
    /// expires at `floor(T) + ttl`, up to one second before `T + ttl`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, AuthError> {
        let mut parts = token.trim().split('.');
        let (h, p, s) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => (h, p, s),
            _ => return Err(AuthError::TokenMalformed),
        };

        let header: TokenHeader = URL_SAFE_NO_PAD
            .decode(h)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(AuthError::TokenMalformed)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::TokenMalformed);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| AuthError::TokenSignatureInvalid)?;

        let mut mac = self.mac()?;
        mac.update(h.as_bytes());
        mac.update(b".");
        mac.update(p.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::TokenSignatureInvalid)?;

        let claims: TokenClaims = URL_SAFE_NO_PAD
            .decode(p)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(AuthError::TokenMalformed)?;

        if now.timestamp() >= claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(VerifiedToken {
            identity: claims.id,
            issued_at: claims.iat,
        })
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| AuthError::Config(format!("invalid signing key: {}", e)))
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issuer() -> TokenIssuer {
        let config = AuthConfig::new(b"test-signing-key-0123456789abcdef".to_vec()).unwrap();
        TokenIssuer::new(&config)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn tamper_tag(token: &str) -> String {
        let (signed, tag) = token.rsplit_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(tag).unwrap();
        bytes[0] ^= 0x01;
        format!("{}.{}", signed, URL_SAFE_NO_PAD.encode(bytes))
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let token = issuer.issue("user-1", at(1_000)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let verified = issuer.verify(&token, at(1_000)).unwrap();
        assert_eq!(verified.identity, "user-1");
        assert_eq!(verified.issued_at, 1_000);
    }

    #[test]
    fn test_validity_window() {
        let issuer = issuer();
        let ttl = issuer.ttl().num_seconds();
        let token = issuer.issue("user-1", at(1_000)).unwrap();

        assert!(issuer.verify(&token, at(1_000)).is_ok());
        assert!(issuer.verify(&token, at(1_000 + ttl - 1)).is_ok());
        assert!(issuer
            .verify(&token, at(1_000 + ttl - 1) + Duration::milliseconds(999))
            .is_ok());
        assert_eq!(
            issuer.verify(&token, at(1_000 + ttl)),
            Err(AuthError::TokenExpired)
        );
        assert_eq!(
            issuer.verify(&token, at(1_000 + ttl + 86_400)),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn test_tampered_tag_rejected() {
        let issuer = issuer();
        let token = issuer.issue("user-1", at(1_000)).unwrap();

        assert_eq!(
            issuer.verify(&tamper_tag(&token), at(1_000)),
            Err(AuthError::TokenSignatureInvalid)
        );
    }

    #[test]
    fn test_signature_checked_before_expiry() {
        let issuer = issuer();
        let token = issuer.issue("user-1", at(1_000)).unwrap();
        let far_future = at(1_000) + Duration::days(3650);

        assert_eq!(
            issuer.verify(&tamper_tag(&token), far_future),
            Err(AuthError::TokenSignatureInvalid)
        );
    }

    #[test]
    fn test_forged_claims_rejected() {
        let issuer = issuer();
        let token = issuer.issue("user-1", at(1_000)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = TokenClaims {
            id: "admin".to_string(),
            iat: 1_000,
            exp: 9_999_999_999,
        };
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            parts[2]
        );
        assert_eq!(
            issuer.verify(&forged, at(1_000)),
            Err(AuthError::TokenSignatureInvalid)
        );
    }

    #[test]
    fn test_other_key_rejected() {
        let token = issuer().issue("user-1", at(1_000)).unwrap();
        let other = TokenIssuer::new(&AuthConfig::new(vec![42u8; 32]).unwrap());

        assert_eq!(
            other.verify(&token, at(1_000)),
            Err(AuthError::TokenSignatureInvalid)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let issuer = issuer();
        for token in ["", "loggedout", "a.b", "a.b.c.d", ".payload.tag", "!!!.???.tag"] {
            assert_eq!(
                issuer.verify(token, at(1_000)),
                Err(AuthError::TokenMalformed),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_unsigned_algorithm_rejected() {
        let issuer = issuer();
        let token = issuer.issue("user-1", at(1_000)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let none_header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);

        let unsigned = format!("{}.{}.", none_header, parts[1]);
        assert_eq!(
            issuer.verify(&unsigned, at(1_000)),
            Err(AuthError::TokenMalformed)
        );

        let stripped = format!("{}.{}.", parts[0], parts[1]);
        assert_eq!(
            issuer.verify(&stripped, at(1_000)),
            Err(AuthError::TokenSignatureInvalid)
        );
    }

    #[test]
    fn test_issue_rejects_unusable_lifetime() {
        let mut config = AuthConfig::new(b"test-signing-key-0123456789abcdef".to_vec()).unwrap();

        config.token_ttl = Duration::days(100_000_000);
        assert!(matches!(
            TokenIssuer::new(&config).issue("user-1", at(1_000)),
            Err(AuthError::Config(_))
        ));

        config.token_ttl = Duration::days(-1);
        assert!(matches!(
            TokenIssuer::new(&config).issue("user-1", at(1_000)),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_fractional_issue_time_uses_encoded_iat() {
        let issuer = issuer();
        let ttl = issuer.ttl().num_seconds();
        let issued = at(1_000) + Duration::milliseconds(750);
        let token = issuer.issue("user-1", issued).unwrap();

        assert_eq!(issuer.verify(&token, issued).unwrap().issued_at, 1_000);
        assert_eq!(
            issuer.verify(&token, at(1_000 + ttl) + Duration::milliseconds(100)),
            Err(AuthError::TokenExpired)
        );
    }
}
