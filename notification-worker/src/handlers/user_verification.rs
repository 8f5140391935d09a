//! Account verification email handler.
//!
//! Consumes `{"username", "email", "token"}` messages and mails the user a
//! link to the verification endpoint carrying their token.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::email::EmailSender;
use crate::handler::MessageHandler;

/// Queue carrying verification requests.
pub const USER_VERIFICATION_QUEUE: &str = "user-verification-email";

const SUBJECT: &str = "Verify Your Account";

/// Payload published by the auth service for a new account.
#[derive(Debug, Deserialize)]
pub struct UserVerificationMessage {
    pub username: String,
    pub email: String,
    pub token: String,
}

/// Sends the verification email for each message.
pub struct UserVerificationEmailHandler {
    sender: Arc<dyn EmailSender>,
    verification_url: Url,
}

impl UserVerificationEmailHandler {
    /// Create a handler linking to `verification_base_url`.
    pub fn new(
        sender: Arc<dyn EmailSender>,
        verification_base_url: &str,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            sender,
            verification_url: Url::parse(verification_base_url)?,
        })
    }

    fn verification_link(&self, token: &str) -> Url {
        let mut link = self.verification_url.clone();
        link.query_pairs_mut().append_pair("token", token);
        link
    }

    fn render_body(&self, msg: &UserVerificationMessage) -> String {
        format!(
            "Hello {},\n\nPlease verify your account by clicking on the link below:\n{}\n\nThank you!",
            msg.username,
            self.verification_link(&msg.token)
        )
    }
}

#[async_trait]
impl MessageHandler for UserVerificationEmailHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        let msg: UserVerificationMessage = serde_json::from_slice(payload)
            .context("invalid user verification message")?;

        let body = self.render_body(&msg);

        if let Err(e) = self.sender.send(&msg.email, SUBJECT, &body).await {
            warn!(to = %msg.email, error = %e, "verification_email_failed");
            return Err(e).with_context(|| {
                format!("failed to send verification email to [{}]", msg.email)
            });
        }

        info!(to = %msg.email, "verification_email_sent");
        Ok(())
    }
}
