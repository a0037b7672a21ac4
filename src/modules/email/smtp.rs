use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use std::env;
use std::fmt;

use super::{EmailError, Mailer, OutgoingEmail};
use crate::auth::config::is_production;
use crate::auth::errors::AuthError;

const DEFAULT_SMTP_PORT: u16 = 587;
const SEND_TIMEOUT_SECS: u64 = 10;

const SENDGRID_HOST: &str = "smtp.sendgrid.net";

/// Structure to hold SMTP connection settings
#[derive(Clone)]
pub struct SmtpSettings {
    // SMTP server hostname (e.g., smtp.mailtrap.io)
    pub host: String,
    // SMTP server port (typically 587 for STARTTLS)
    pub port: u16,
    pub username: String,
    pub password: String,
    // Sender shown to recipients, e.g. "Natours <hello@natours.dev>"
    pub from: String,
    // Refuse to send without STARTTLS; development relays may not offer it
    pub require_tls: bool,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from", &self.from)
            .field("require_tls", &self.require_tls)
            .finish_non_exhaustive()
    }
}

impl SmtpSettings {
    /// Read settings from the environment.
    ///
    /// In production (`APP_ENV`/`NODE_ENV` = `production`) mail goes through
    /// SendGrid with `SENDGRID_USERNAME`/`SENDGRID_PASSWORD`. Otherwise the
    /// `EMAIL_*` relay is used, and `Ok(None)` means no relay is configured.
    pub fn from_env() -> Result<Option<Self>, AuthError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .ok_or_else(|| AuthError::Config(format!("missing environment variable {}", name)))
        };

        if is_production(&lookup) {
            return Ok(Some(Self {
                host: SENDGRID_HOST.to_string(),
                port: DEFAULT_SMTP_PORT,
                username: required("SENDGRID_USERNAME")?,
                password: required("SENDGRID_PASSWORD")?,
                from: required("EMAIL_FROM")?,
                require_tls: true,
            }));
        }

        let Some(host) = lookup("EMAIL_HOST") else {
            return Ok(None);
        };

        let port = match lookup("EMAIL_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AuthError::Config(format!("invalid EMAIL_PORT: {}", raw)))?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Some(Self {
            host,
            port,
            username: required("EMAIL_USERNAME")?,
            password: required("EMAIL_PASSWORD")?,
            from: required("EMAIL_FROM")?,
            require_tls: false,
        }))
    }
}

/// Mailer delivering through an SMTP relay
pub struct SmtpMailer {
    settings: SmtpSettings,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, EmailError> {
        // Configure TLS parameters
        let tls_parameters = TlsParameters::builder(settings.host.clone())
            .build()
            .map_err(|e| EmailError::Transport(format!("failed to build TLS parameters: {}", e)))?;

        // Set up SMTP transport with explicit TLS configuration
        let transport = SmtpTransport::relay(&settings.host)
            .map_err(|e| EmailError::Transport(format!("failed to create SMTP transport: {}", e)))?
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .port(settings.port)
            .tls(if settings.require_tls {
                Tls::Required(tls_parameters)
            } else {
                Tls::Opportunistic(tls_parameters)
            })
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(std::time::Duration::from_secs(SEND_TIMEOUT_SECS)))
            .build();

        Ok(Self {
            settings,
            transport,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        let from: Mailbox = self
            .settings
            .from
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", self.settings.from, e)))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", email.to, e)))?;

        let builder = Message::builder().from(from).to(to).subject(email.subject.clone());

        let message = match &email.html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                email.body.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(email.body.clone()),
        };
        message.map_err(|e| EmailError::Message(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = self.build_message(email)?;
        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| EmailError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "hunter2hunter2".to_string(),
            from: "Natours <hello@natours.dev>".to_string(),
            require_tls: false,
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_debug_hides_password() {
        let printed = format!("{:?}", settings());
        assert!(printed.contains("smtp.example.com"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_development_relay_settings() {
        let settings = SmtpSettings::from_lookup(vars(&[
            ("EMAIL_HOST", "smtp.mailtrap.io"),
            ("EMAIL_PORT", "2525"),
            ("EMAIL_USERNAME", "dev"),
            ("EMAIL_PASSWORD", "devpass"),
            ("EMAIL_FROM", "hello@natours.dev"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(settings.host, "smtp.mailtrap.io");
        assert_eq!(settings.port, 2525);
        assert!(!settings.require_tls);

        assert!(SmtpSettings::from_lookup(vars(&[])).unwrap().is_none());
    }

    #[test]
    fn test_production_uses_sendgrid() {
        let settings = SmtpSettings::from_lookup(vars(&[
            ("NODE_ENV", "production"),
            ("EMAIL_HOST", "smtp.mailtrap.io"),
            ("SENDGRID_USERNAME", "apikey"),
            ("SENDGRID_PASSWORD", "sg-secret"),
            ("EMAIL_FROM", "hello@natours.dev"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(settings.host, "smtp.sendgrid.net");
        assert_eq!(settings.username, "apikey");
        assert!(settings.require_tls);

        let missing = SmtpSettings::from_lookup(vars(&[
            ("NODE_ENV", "production"),
            ("EMAIL_FROM", "hello@natours.dev"),
        ]));
        assert!(matches!(missing, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_build_message() {
        let mailer = SmtpMailer::new(settings()).unwrap();
        let email = OutgoingEmail {
            to: "leo@example.com".to_string(),
            subject: "Welcome".to_string(),
            body: "Hello".to_string(),
            html: None,
        };
        assert!(mailer.build_message(&email).is_ok());

        let with_html = OutgoingEmail {
            html: Some("<p>Hello</p>".to_string()),
            ..email.clone()
        };
        let formatted = String::from_utf8(mailer.build_message(&with_html).unwrap().formatted())
            .unwrap();
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("text/html"));

        let bad = OutgoingEmail {
            to: "not an address".to_string(),
            ..email
        };
        assert!(matches!(
            mailer.build_message(&bad),
            Err(EmailError::InvalidAddress(_))
        ));
    }
}
