use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;

use super::{NotificationAdapter, Outbound, SendResult};
use crate::error::NotificationError;

type HmacSha256 = Hmac<Sha256>;

/// POSTs arbitrary JSON to a caller-supplied URL.
pub struct WebhookAdapter {
    http_client: Client,
    secret: Option<String>,
}

impl WebhookAdapter {
    pub fn new(http_client: Client, secret: Option<String>) -> Self {
        Self {
            http_client,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    fn sign_payload(&self, payload: &str, secret: &str) -> Result<String, NotificationError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::Internal(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new(Client::new(), None)
    }
}

#[async_trait]
impl NotificationAdapter for WebhookAdapter {
    async fn send(&self, message: &Outbound) -> Result<SendResult, NotificationError> {
        let Outbound::Webhook { url, payload } = message else {
            return Err(NotificationError::InvalidConfig(format!(
                "webhook adapter cannot deliver {} messages",
                message.channel()
            )));
        };
        if url.trim().is_empty() {
            return Err(NotificationError::InvalidConfig("Missing webhook url".into()));
        }

        let payload_str = serde_json::to_string(payload)
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let mut request = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.secret {
            let signature = self.sign_payload(&payload_str, secret)?;
            request = request.header("X-Signature-256", format!("sha256={}", signature));
        }

        let response = request
            .body(payload_str)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let status = response.status();
        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            signed = self.secret.is_some(),
            "Webhook delivered"
        );
        Ok(SendResult {
            success: status.is_success(),
            status: status.as_u16(),
            error: (!status.is_success()).then(|| format!("Webhook {}", status.as_u16())),
        })
    }
}
