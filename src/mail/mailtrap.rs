//! Mailtrap transactional send API client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

use super::{MailError, MailMessage, Mailer};

pub const DEFAULT_MAILTRAP_URL: &str = "https://send.api.mailtrap.io/api/send";

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: Address<'a>,
    to: Vec<Address<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Address<'a>>,
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<String>,
}

impl<'a> SendRequest<'a> {
    fn from_message(message: &'a MailMessage) -> Self {
        Self {
            from: Address {
                email: &message.sender,
            },
            to: message
                .to
                .iter()
                .map(|email| Address { email })
                .collect(),
            reply_to: message.reply_to.as_deref().map(|email| Address { email }),
            subject: &message.subject,
            html: &message.html_body,
        }
    }
}

#[derive(Clone)]
pub struct MailtrapMailer {
    client: Client,
    url: String,
    token: SecretString,
}

impl MailtrapMailer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, token: SecretString) -> Result<Self, MailError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            token,
        })
    }
}

impl std::fmt::Debug for MailtrapMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailtrapMailer")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

#[async_trait]
impl Mailer for MailtrapMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let span = info_span!(
            "mail.send",
            mail.transport = "mailtrap",
            mail.recipients = message.to.len()
        );
        async {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(self.token.expose_secret())
                .json(&SendRequest::from_message(message))
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(MailError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            // A 2xx with `success: false` is still an unconfirmed send.
            match serde_json::from_str::<SendResponse>(&body) {
                Ok(parsed) if parsed.success => {
                    debug!("mailtrap accepted message");
                    Ok(())
                }
                Ok(parsed) => Err(MailError::Rejected {
                    status: status.as_u16(),
                    body: parsed.errors.join("; "),
                }),
                Err(_) => Err(MailError::Rejected {
                    status: status.as_u16(),
                    body,
                }),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MailMessage {
        MailMessage {
            to: vec!["committee@parliament.bg".to_string()],
            sender: "no-reply@glas.bg".to_string(),
            subject: "Гражданско писмо".to_string(),
            html_body: "<p>Здравейте</p>".to_string(),
            reply_to: Some("ana.petrova@glas.bg".to_string()),
        }
    }

    #[test]
    fn request_body_matches_api_shape() -> anyhow::Result<()> {
        let message = message();
        let value = serde_json::to_value(SendRequest::from_message(&message))?;
        assert_eq!(value["from"]["email"], "no-reply@glas.bg");
        assert_eq!(value["to"][0]["email"], "committee@parliament.bg");
        assert_eq!(value["reply_to"]["email"], "ana.petrova@glas.bg");
        assert_eq!(value["subject"], "Гражданско писмо");
        assert_eq!(value["html"], "<p>Здравейте</p>");
        Ok(())
    }

    #[test]
    fn reply_to_is_omitted_when_absent() -> anyhow::Result<()> {
        let mut message = message();
        message.reply_to = None;
        let value = serde_json::to_value(SendRequest::from_message(&message))?;
        assert!(value.get("reply_to").is_none());
        Ok(())
    }

    #[test]
    fn debug_hides_token() -> anyhow::Result<()> {
        let mailer = MailtrapMailer::new(
            DEFAULT_MAILTRAP_URL,
            SecretString::from("tok-123".to_string()),
        )?;
        assert!(!format!("{mailer:?}").contains("tok-123"));
        Ok(())
    }

    #[test]
    fn response_defaults_to_unconfirmed() -> anyhow::Result<()> {
        let parsed: SendResponse = serde_json::from_str("{}")?;
        assert!(!parsed.success);
        Ok(())
    }
}
