/// Message shown for every authentication failure, whatever triggered it.
pub const LOGIN_AGAIN_MESSAGE: &str = "You are not logged in. Please log in again.";

/// Every failure the credential subsystem can report. All are recoverable at
/// the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credential input: {0}")]
    InvalidCredentialInput(String),
    #[error("Wrong password")]
    WrongPassword,
    #[error("Token is malformed")]
    TokenMalformed,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token signature is invalid")]
    TokenSignatureInvalid,
    #[error("Password changed after the token was issued")]
    StaleToken,
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("Reset secret has expired")]
    ResetSecretExpired,
    #[error("Reset secret does not match")]
    ResetSecretMismatch,
    #[error("Role is not permitted to perform this action")]
    Forbidden,
    #[error("Email address is already registered")]
    EmailTaken,
    #[error("No account with that email address")]
    NoSuchAccount,
    #[error("Email delivery failed: {0}")]
    EmailDelivery(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Terminal I/O failed: {0}")]
    Terminal(String),
}

impl AuthError {
    /// True for the conditions the gate collapses into "please log in again".
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenMalformed
                | AuthError::TokenExpired
                | AuthError::TokenSignatureInvalid
                | AuthError::StaleToken
                | AuthError::Unauthenticated
        )
    }

    /// HTTP status a controller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentialInput(_) | AuthError::ResetSecretExpired => 400,
            AuthError::ResetSecretMismatch => 400,
            AuthError::WrongPassword => 401,
            e if e.is_authentication_failure() => 401,
            AuthError::Forbidden => 403,
            AuthError::NoSuchAccount => 404,
            AuthError::EmailTaken => 409,
            _ => 500,
        }
    }

    /// `"fail"` for client errors, `"error"` for server errors.
    pub fn status(&self) -> &'static str {
        if self.status_code() < 500 {
            "fail"
        } else {
            "error"
        }
    }

    /// Text safe to show to the caller. Security-sensitive conditions get
    /// generic wording so the response does not reveal which check failed.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidCredentialInput(reason) => reason.clone(),
            AuthError::ResetSecretExpired => {
                "Your reset token has expired. Please request a new one.".to_string()
            }
            AuthError::WrongPassword => "Incorrect email or password".to_string(),
            AuthError::ResetSecretMismatch => "Token is invalid or has expired".to_string(),
            e if e.is_authentication_failure() => LOGIN_AGAIN_MESSAGE.to_string(),
            AuthError::Forbidden => {
                "You do not have permission to perform this action".to_string()
            }
            AuthError::EmailTaken => "An account with that email already exists".to_string(),
            AuthError::NoSuchAccount => "There is no user with that email address".to_string(),
            AuthError::EmailDelivery(_) => {
                "There was an error sending the email. Try again later!".to_string()
            }
            AuthError::Terminal(reason) => format!("Could not use the terminal: {}", reason),
            _ => "Something went wrong".to_string(),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}
