//! Wire protocol messages exchanged over the WebSocket channel.
//!
//! Messages are JSON with a `type` tag and camelCase fields. `credits` is
//! `null` when the user holds the unlimited-credits override, mirroring the
//! `infiniteCredits` flag.

use serde::{Deserialize, Serialize};

use super::model::{StrokeChunk, StrokeRecord};

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { room_id: String, user_id: String },
    StrokeChunk { chunk: StrokeChunk },
    CheatCode { code: String },
    Ping,
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Init {
        snapshot_url: Option<String>,
        strokes_since_snapshot: Vec<StrokeRecord>,
        credits: Option<i64>,
        infinite_credits: bool,
    },
    StrokeChunkBroadcast {
        chunk: StrokeRecord,
    },
    #[serde(rename_all = "camelCase")]
    CreditsUpdate {
        credits: Option<i64>,
        infinite_credits: bool,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    /// Serialize for the wire. Serialization of these enums cannot fail.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize server message: {}", e);
            r#"{"type":"error","message":"internal error"}"#.to_string()
        })
    }
}
