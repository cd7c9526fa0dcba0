//! Outbound webhook sink.
//!
//! [`ChannelWebhook`] serializes each changed block into a [`WebhookPayload`]
//! and queues it on an unbounded channel. Whatever owns the receiver performs
//! the actual HTTP delivery.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use corkboard_types::Block;

/// Best-effort external push of a changed block.
pub trait Webhook: Send + Sync {
    fn notify_update(&self, block: &Block);
}

/// One queued webhook delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub block_id: String,
    pub board_id: String,
    /// JSON body to POST.
    pub body: String,
}

/// [`Webhook`] that queues payloads on an mpsc channel.
#[derive(Clone, Debug)]
pub struct ChannelWebhook {
    tx: mpsc::UnboundedSender<WebhookPayload>,
}

impl ChannelWebhook {
    /// Create a webhook sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WebhookPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Webhook for ChannelWebhook {
    fn notify_update(&self, block: &Block) {
        let body = match serde_json::to_string(block) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(block_id = %block.id, error = %e, "failed to serialize webhook payload");
                return;
            }
        };
        let payload = WebhookPayload {
            block_id: block.id.clone(),
            board_id: block.board_id.clone(),
            body,
        };
        if self.tx.send(payload).is_err() {
            tracing::debug!(block_id = %block.id, "webhook receiver closed, dropping update");
        }
    }
}
