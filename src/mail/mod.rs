//! Outbound mail delivery.
//!
//! The core hands a fully rendered [`MailMessage`] to a [`Mailer`] and treats
//! any error as "send not confirmed". Two implementations ship:
//!
//! - [`MailtrapMailer`] posts to the Mailtrap send API.
//! - [`LogMailer`] logs the envelope and returns `Ok(())`, for local runs
//!   without a transport token.
pub mod mailtrap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use mailtrap::MailtrapMailer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub sender: String,
    pub subject: String,
    pub html_body: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail transport rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Mail delivery abstraction used by the request orchestrator.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error if delivery was not confirmed.
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Local dev mailer that logs the envelope instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        // Recipients are entity or citizen addresses; only counts are logged.
        info!(
            recipients = message.to.len(),
            sender = %message.sender,
            subject = %message.subject,
            body_len = message.html_body.len(),
            "mail send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_confirms() -> anyhow::Result<()> {
        let message = MailMessage {
            to: vec!["committee@parliament.bg".to_string()],
            sender: "no-reply@glas.bg".to_string(),
            subject: "Test".to_string(),
            html_body: "<p>hi</p>".to_string(),
            reply_to: None,
        };
        LogMailer.send(&message).await?;
        Ok(())
    }

    #[test]
    fn rejection_message_carries_status() {
        let err = MailError::Rejected {
            status: 401,
            body: "Unauthorized".to_string(),
        };
        assert!(err.to_string().contains("401"));
    }
}
