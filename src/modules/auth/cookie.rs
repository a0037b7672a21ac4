use chrono::{DateTime, Duration, Utc};

use super::errors::AuthError;
use crate::{LOGGED_OUT_COOKIE_VALUE, SESSION_COOKIE};

const LOGGED_OUT_TTL_SECS: i64 = 10;

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(
    token: &str,
    now: DateTime<Utc>,
    ttl: Duration,
    secure: bool,
) -> Result<String, AuthError> {
    let expires = now
        .checked_add_signed(ttl)
        .filter(|_| ttl > Duration::zero())
        .ok_or_else(|| AuthError::Config("cookie lifetime out of range".into()))?;

    let mut cookie = format!(
        "{}={}; Expires={}; Path=/; HttpOnly",
        SESSION_COOKIE,
        token,
        http_date(expires)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    Ok(cookie)
}

/// `Set-Cookie` value that overwrites the session token on logout
pub fn logout_cookie(now: DateTime<Utc>) -> String {
    format!(
        "{}={}; Expires={}; Path=/; HttpOnly",
        SESSION_COOKIE,
        LOGGED_OUT_COOKIE_VALUE,
        http_date(now + Duration::seconds(LOGGED_OUT_TTL_SECS))
    )
}

/// Value of the session cookie in a `Cookie` request header, if any
pub fn session_token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
