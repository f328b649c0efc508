//! The optional webhook forwarder for messages in protected rooms (§D.7).

use crate::error::DispatcherError;
use async_trait::async_trait;
use warden_core::event::MessageEvent;

/// Forwards `m.room.message`/`m.sticker` events seen in protected rooms to
/// an external collaborator. Entirely optional; a dispatcher with no
/// forwarder configured just skips these events.
#[async_trait]
pub trait MessageForwarder: Send + Sync {
    /// Forward one message event.
    async fn forward(&self, event: &MessageEvent) -> Result<(), DispatcherError>;
}

/// Posts each message as a JSON payload to a configured webhook URL.
pub struct ReqwestMessageForwarder {
    client: reqwest::Client,
    webhook_url: String,
}

impl ReqwestMessageForwarder {
    /// Build a forwarder posting to `webhook_url`.
    pub fn new(webhook_url: String) -> Self {
        Self { client: reqwest::Client::new(), webhook_url }
    }
}

#[async_trait]
impl MessageForwarder for ReqwestMessageForwarder {
    async fn forward(&self, event: &MessageEvent) -> Result<(), DispatcherError> {
        let payload = serde_json::json!({
            "room_id": event.room_id.as_str(),
            "sender": event.sender.as_str(),
            "event_id": event.event_id,
            "body": event.body,
        });
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatcherError::Forward(e.to_string()))?
            .error_for_status()
            .map_err(|e| DispatcherError::Forward(e.to_string()))?;
        Ok(())
    }
}
