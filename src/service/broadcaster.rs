//! Room-scoped message fan-out.
//!
//! Best-effort: a failed send to an individual peer is logged and skipped,
//! never surfaced to the sender. Broadcast to an empty room is a no-op.

use std::sync::Arc;

use crate::domain::ServerMessage;
use crate::service::registry::{ConnectionRegistry, OutboundFrame};

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `message` to every connection in `room_id`, excluding
    /// `exclude` (usually the original sender).
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        message: &ServerMessage,
        exclude: Option<&str>,
    ) {
        let targets = self.registry.room_senders(room_id, exclude).await;
        if targets.is_empty() {
            return;
        }

        let json = message.to_json();
        for (conn_id, sender) in targets {
            if sender.send(OutboundFrame::Text(json.clone())).is_err() {
                tracing::warn!("Failed to push message to connection '{}'", conn_id);
            }
        }
    }
}
