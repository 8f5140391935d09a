//! Email delivery capability used by notification handlers.
//!
//! `SmtpEmailSender` talks to an SMTP relay through lettre's tokio transport.
//! When email is disabled in configuration it accepts every message without
//! touching the network, so handlers see a silent success.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpConfig;

/// Errors raised while sending an email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email address [{address}]: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build email message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("failed to send email: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Sends a plain-text email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

/// SMTP-backed email sender.
pub struct SmtpEmailSender {
    from: Mailbox,
    host: String,
    // None when sending is disabled
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailSender {
    /// Build a sender from SMTP settings.
    ///
    /// No connection is made here; lettre connects lazily on the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let from = parse_mailbox(&config.from)?;

        let transport = if config.enabled {
            Some(build_transport(config)?)
        } else {
            None
        };

        Ok(Self {
            from,
            host: config.host.clone(),
            transport,
        })
    }

    /// Whether messages actually leave the process.
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

fn build_transport(config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
    let mut builder = if config.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port)
    } else {
        // Plain transport for local relays such as Mailpit
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
    };

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse()
        .map_err(|source| EmailError::InvalidAddress {
            address: address.to_owned(),
            source,
        })
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let Some(transport) = &self.transport else {
            info!(to = %to, "email_disabled");
            return Ok(());
        };

        debug!(to = %to, subject = %subject, host = %self.host, "email_sending");

        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())?;

        transport.send(message).await?;

        info!(to = %to, "email_sent");
        Ok(())
    }
}
