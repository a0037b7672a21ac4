mod smtp;
mod templates;

pub use smtp::{SmtpMailer, SmtpSettings};
pub use templates::{first_name, password_reset_email, render_html, welcome_email};

use crate::auth::errors::AuthError;

/// Failure reported by a delivery transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<EmailError> for AuthError {
    fn from(e: EmailError) -> Self {
        AuthError::EmailDelivery(e.to_string())
    }
}

/// A rendered message ready for delivery. `html`, when set, is sent as an
/// alternative to the plain-text `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
}

/// Delivery collaborator. Implementations only move bytes; message content
/// comes from the templates.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

impl<T: Mailer + ?Sized> Mailer for Box<T> {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        (**self).send(email)
    }
}

/// Development transport that prints messages to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        println!("----- email -----");
        println!("To: {}", email.to);
        println!("Subject: {}", email.subject);
        println!();
        println!("{}", email.body);
        println!("-----------------");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_error_maps_to_delivery_failure() {
        let err: AuthError = EmailError::Transport("connection refused".into()).into();
        assert_eq!(
            err,
            AuthError::EmailDelivery("transport failure: connection refused".into())
        );
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_console_mailer_accepts_message() {
        let email = OutgoingEmail {
            to: "user@example.com".into(),
            subject: "Hello".into(),
            body: "Body".into(),
            html: None,
        };
        assert!(ConsoleMailer.send(&email).is_ok());
    }
}
