//! Outbound delivery for the `email` and `slack` channels.

use async_trait::async_trait;
use serde::Serialize;

use courier_shared::clients::email::{EmailClient, EmailError};

/// Subject used when an email record carries none.
const DEFAULT_SUBJECT: &str = "New notification";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid receiver email: {0:?}")]
    InvalidRecipient(Option<String>),

    #[error("slack record has no webhook")]
    MissingWebhook,

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("slack webhook failed: {0}")]
    Slack(#[from] reqwest::Error),
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_email(
        &self,
        receiver_email: Option<&str>,
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), ChannelError>;

    async fn send_slack(&self, webhook_url: &str, message: &str) -> Result<(), ChannelError>;
}

/// Checks the address before any network call.
pub fn checked_recipient(receiver_email: Option<&str>) -> Result<&str, ChannelError> {
    match receiver_email.map(str::trim) {
        Some(address) if validator::validate_email(address) => Ok(address),
        other => Err(ChannelError::InvalidRecipient(other.map(str::to_string))),
    }
}

#[derive(Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

#[derive(Clone)]
pub struct HttpChannelSender {
    email: EmailClient,
    http: reqwest::Client,
}

impl HttpChannelSender {
    pub fn new(email: EmailClient, http: reqwest::Client) -> Self {
        Self { email, http }
    }
}

#[async_trait]
impl ChannelSender for HttpChannelSender {
    async fn send_email(
        &self,
        receiver_email: Option<&str>,
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), ChannelError> {
        let to = checked_recipient(receiver_email)?;
        self.email
            .send_notification(to, subject.unwrap_or(DEFAULT_SUBJECT), message)
            .await?;
        Ok(())
    }

    async fn send_slack(&self, webhook_url: &str, message: &str) -> Result<(), ChannelError> {
        self.http
            .post(webhook_url)
            .json(&SlackMessage { text: message })
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!("slack message posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_must_be_a_valid_address() {
        assert_eq!(checked_recipient(Some(" a@b.com ")).unwrap(), "a@b.com");
        assert!(matches!(
            checked_recipient(None),
            Err(ChannelError::InvalidRecipient(None))
        ));
        assert!(matches!(
            checked_recipient(Some("not-an-address")),
            Err(ChannelError::InvalidRecipient(Some(_)))
        ));
    }

    #[test]
    fn slack_payload_shape() {
        let json = serde_json::to_value(SlackMessage { text: "hi" }).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi" }));
    }
}
