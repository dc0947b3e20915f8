pub mod email;
pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::NotificationError;

/// Result of one delivery attempt that reached the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    /// HTTP status returned by the remote end.
    pub status: u16,
    pub error: Option<String>,
}

/// Email as accepted by the relay webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
}

/// Something an adapter can deliver.
#[derive(Debug, Clone)]
pub enum Outbound {
    Email(EmailMessage),
    Webhook { url: String, payload: Value },
}

impl Outbound {
    pub fn channel(&self) -> &'static str {
        match self {
            Outbound::Email(_) => "email",
            Outbound::Webhook { .. } => "webhook",
        }
    }
}

/// Adapter for delivering outbound messages
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// Deliver a message. Transport failures are errors; a response with a
    /// non-success status is reported through [`SendResult`].
    async fn send(&self, message: &Outbound) -> Result<SendResult, NotificationError>;
}

pub use email::EmailRelayAdapter;
pub use webhook::WebhookAdapter;
