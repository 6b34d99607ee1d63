use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::info;

use crate::templates::Email;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Email task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Builds the MIME message: a multipart/alternative with the text part first.
pub fn build_message(from: &str, email: &Email) -> Result<Message, MailError> {
    let message = Message::builder()
        .from(mailbox(from)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject.clone())
        .multipart(MultiPart::alternative_plain_html(email.text.clone(), email.html.clone()))?;
    Ok(message)
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
}

/// Sends through an SMTP relay. A transport is built per email.
#[derive(Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> Result<SmtpTransport, MailError> {
        let mut builder = SmtpTransport::relay(&self.config.host)?.port(self.config.port);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = build_message(&self.config.from_email, email)?;
        let transport = self.build_transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message)).await??;

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Logs emails instead of delivering them. Used when no SMTP host is configured.
#[derive(Debug, Clone)]
pub struct ConsoleMailer {
    from_email: String,
}

impl ConsoleMailer {
    pub fn new(from_email: String) -> Self {
        Self { from_email }
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        // Same validation as the SMTP path, so bad addresses show up in development.
        build_message(&self.from_email, email)?;
        info!(
            from = %self.from_email,
            to = %email.to,
            subject = %email.subject,
            "Email (console mode)\n{}",
            email.text
        );
        Ok(())
    }
}
