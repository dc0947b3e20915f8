use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{NotificationAdapter, Outbound, SendResult};
use crate::error::NotificationError;

/// Sends email by POSTing the message to a relay webhook that owns the
/// actual provider integration.
pub struct EmailRelayAdapter {
    http_client: Client,
    relay_url: Option<String>,
}

impl EmailRelayAdapter {
    pub fn new(http_client: Client, relay_url: Option<String>) -> Self {
        Self {
            http_client,
            relay_url: relay_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.relay_url.is_some()
    }
}

/// `message` from a JSON error body, else `HTTP <status>`.
fn relay_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[async_trait]
impl NotificationAdapter for EmailRelayAdapter {
    async fn send(&self, message: &Outbound) -> Result<SendResult, NotificationError> {
        let Outbound::Email(email) = message else {
            return Err(NotificationError::InvalidConfig(format!(
                "email relay cannot deliver {} messages",
                message.channel()
            )));
        };

        let url = self.relay_url.as_ref().ok_or(NotificationError::InvalidConfig(
            "Missing email relay url (automation.email_relay_url)".into(),
        ))?;

        if email.to.is_empty() {
            return Err(NotificationError::RecipientNotFound);
        }

        let response = self
            .http_client
            .post(url)
            .json(email)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            recipients = email.to.len(),
            "Email relay responded"
        );
        if status.is_success() {
            Ok(SendResult {
                success: true,
                status: status.as_u16(),
                error: None,
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Email relay rejected message");
            Ok(SendResult {
                success: false,
                status: status.as_u16(),
                error: Some(relay_error_message(status.as_u16(), &body)),
            })
        }
    }
}
