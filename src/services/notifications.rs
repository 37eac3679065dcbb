//! Notification collaborator
//!
//! Fire-and-forget customer/operator messages. Failures are reported to the
//! caller but never retried; the lifecycle treats sends as best-effort.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use crate::{Result, SnazzError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Dispatch,
    Cancellation,
    Refund,
    InternalAlert,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Cancellation => "cancellation",
            Self::Refund => "refund",
            Self::InternalAlert => "internal_alert",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Recipient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, template: TemplateType, recipient: &Recipient, context: Value) -> Result<()>;
}

/// Publishes notification envelopes to NATS; the email/WhatsApp workers
/// subscribe on `snazzpay.notifications.<template>`.
pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl NotificationSender for NatsNotifier {
    async fn send(&self, template: TemplateType, recipient: &Recipient, context: Value) -> Result<()> {
        let envelope = json!({
            "template": template,
            "recipient": recipient,
            "context": context,
        });
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| SnazzError::Notification(e.to_string()))?;
        self.client
            .publish(format!("snazzpay.notifications.{}", template.as_str()), payload.into())
            .await
            .map_err(|e| SnazzError::Notification(e.to_string()))
    }
}

/// Log-only sender for environments without a NATS broker.
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, template: TemplateType, recipient: &Recipient, context: Value) -> Result<()> {
        info!(template = template.as_str(), recipient = %recipient.name, %context, "notification");
        Ok(())
    }
}
