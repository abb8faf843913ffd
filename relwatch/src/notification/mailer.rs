//! Outbound mail transports.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpSettings;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A rendered message for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// The only component that talks to a mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// SMTP relay transport. Connections are opened lazily on first send.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, from: &str, from_name: &str) -> Result<Self, MailError> {
        let address: Address = from
            .parse()
            .map_err(|e| MailError::Address(format!("{from}: {e}")))?;
        let name = Some(from_name.to_string()).filter(|n| !n.trim().is_empty());

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };
        let mut builder = builder.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        debug!(host = %settings.host, port = settings.port, tls = settings.use_tls, "SMTP mailer ready");
        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(name, address),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {e}", email.to)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        debug!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured: the message is logged and dropped.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, email logged instead of sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "New Release: v1 for acme/widget".to_string(),
            text: "plain".to_string(),
            html: "<p>html</p>".to_string(),
        }
    }

    #[test]
    fn rejects_invalid_sender() {
        let err = SmtpMailer::new(&settings(), "not an address", "Release Watch").err();
        assert!(matches!(err, Some(MailError::Address(_))));
    }

    #[test]
    fn builds_multipart_message() {
        let mailer = SmtpMailer::new(&settings(), "noreply@example.com", "Release Watch").unwrap();
        let message = mailer.build_message(&email("user@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: user@example.com"));
        assert!(raw.contains("Subject: New Release: v1 for acme/widget"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn invalid_recipient_is_an_address_error() {
        let mailer = SmtpMailer::new(&settings(), "noreply@example.com", "").unwrap();
        assert!(matches!(
            mailer.build_message(&email("nobody")),
            Err(MailError::Address(_))
        ));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send(&email("user@example.com")).await.is_ok());
    }
}
