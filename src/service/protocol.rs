//! Inbound message state machine.
//!
//! A connection's state is implicit in its registry entry (unjoined vs.
//! joined). Every failure here is local: validation and admission
//! failures become `error` replies to the sender and the connection stays
//! open; store failures are logged and degrade to null/empty results.

use std::sync::Arc;

use crate::common::time::Clock;
use crate::domain::constants::credit;
use crate::domain::{
    ClientMessage, ProtocolError, ServerMessage, SnapshotStore, StrokeChunk, StrokeRecord,
    StrokeStore,
};
use crate::service::broadcaster::Broadcaster;
use crate::service::credits::{CreditLedger, SpendOutcome};
use crate::service::rate_limiter::RateLimiter;
use crate::service::registry::{
    ConnectionRegistry, EVICTED_CLOSE_CODE, FrameSender, OutboundFrame,
};

const KNOWN_MESSAGE_TYPES: [&str; 4] = ["join", "stroke_chunk", "cheat_code", "ping"];

pub struct ProtocolHandler {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    rate_limiter: Arc<RateLimiter>,
    ledger: Arc<CreditLedger>,
    strokes: Arc<dyn StrokeStore>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
}

impl ProtocolHandler {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rate_limiter: Arc<RateLimiter>,
        ledger: Arc<CreditLedger>,
        strokes: Arc<dyn StrokeStore>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            rate_limiter,
            ledger,
            strokes,
            snapshots,
            clock,
        }
    }

    /// Handle one raw inbound text frame from `conn_id`.
    pub async fn handle_raw(&self, conn_id: &str, sender: &FrameSender, raw: &str) {
        let message = match parse_client_message(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Rejecting inbound frame from '{}': {}", conn_id, e);
                reply(sender, &e.to_client_message());
                return;
            }
        };

        if let Err(e) = self.handle_message(conn_id, sender, message).await {
            reply(sender, &e.to_client_message());
        }
    }

    /// Dispatch one parsed message.
    pub async fn handle_message(
        &self,
        conn_id: &str,
        sender: &FrameSender,
        message: ClientMessage,
    ) -> Result<(), ProtocolError> {
        match message {
            ClientMessage::Join { room_id, user_id } => {
                self.handle_join(conn_id, sender, room_id, user_id).await
            }
            ClientMessage::StrokeChunk { chunk } => {
                self.handle_stroke_chunk(conn_id, sender, chunk).await
            }
            ClientMessage::CheatCode { code } => {
                self.handle_cheat_code(conn_id, sender, code).await
            }
            ClientMessage::Ping => {
                reply(sender, &ServerMessage::Pong);
                Ok(())
            }
        }
    }

    /// `join`: register room membership (evicting any other live session
    /// for the user) and reply with the room's replayable state.
    async fn handle_join(
        &self,
        conn_id: &str,
        sender: &FrameSender,
        room_id: String,
        user_id: String,
    ) -> Result<(), ProtocolError> {
        if room_id.is_empty() || user_id.is_empty() {
            return Err(ProtocolError::InvalidJoin);
        }

        let now = self.clock.now_millis();
        if let Some(evicted) = self.registry.join(conn_id, &room_id, &user_id, now).await {
            tracing::info!(
                "Evicting connection '{}': user '{}' joined again on '{}'",
                evicted.connection_id,
                user_id,
                conn_id
            );
            let _ = evicted.sender.send(OutboundFrame::Close {
                code: EVICTED_CLOSE_CODE,
                reason: "New connection from same user",
            });
            self.rate_limiter.release(&evicted.connection_id).await;
        }

        // Store failures degrade to an empty room view, never to a client
        // error.
        let latest = match self.snapshots.latest(&room_id).await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::error!("Failed to fetch latest snapshot for '{}': {}", room_id, e);
                None
            }
        };
        let snapshot_url = latest.as_ref().map(|s| s.url.clone());
        let watermark = latest.as_ref().and_then(|s| s.watermark);

        let strokes_since_snapshot = match self.strokes.strokes_after(&room_id, watermark).await {
            Ok(strokes) => strokes,
            Err(e) => {
                tracing::error!("Failed to fetch strokes for '{}': {}", room_id, e);
                Vec::new()
            }
        };

        let balance = match self.ledger.balance(&user_id).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::error!("Failed to fetch balance for '{}': {}", user_id, e);
                crate::service::credits::Balance::Limited(credit::STARTING_CREDITS)
            }
        };
        let (credits, infinite_credits) = balance.as_wire();

        reply(
            sender,
            &ServerMessage::Init {
                snapshot_url,
                strokes_since_snapshot,
                credits,
                infinite_credits,
            },
        );
        Ok(())
    }

    /// `stroke_chunk`: validate, pass admission control, persist,
    /// broadcast to the room, and report the new balance to the sender.
    async fn handle_stroke_chunk(
        &self,
        conn_id: &str,
        sender: &FrameSender,
        chunk: StrokeChunk,
    ) -> Result<(), ProtocolError> {
        chunk.validate()?;

        let room_id = self
            .registry
            .room_of(conn_id)
            .await
            .ok_or(ProtocolError::RoomMismatch)?;
        if chunk.room_id != room_id {
            return Err(ProtocolError::RoomMismatch);
        }

        let user_id = self
            .registry
            .user_of(conn_id)
            .await
            .ok_or(ProtocolError::NotJoined)?;

        if !self.rate_limiter.admit(conn_id).await {
            return Err(ProtocolError::RateLimited);
        }

        let outcome = self
            .ledger
            .spend(&user_id, chunk.points.len())
            .await
            .map_err(|e| {
                tracing::error!("Credit spend failed for '{}': {}", user_id, e);
                ProtocolError::InvalidFormat
            })?;
        let (credits, infinite_credits) = match outcome {
            SpendOutcome::Charged(balance) => (Some(balance), false),
            SpendOutcome::Unlimited => (None, true),
            SpendOutcome::InsufficientCredits => {
                return Err(ProtocolError::InsufficientCredits);
            }
        };

        let record: StrokeRecord = self
            .strokes
            .append(&user_id, &chunk, self.clock.now_millis())
            .await
            .map_err(|e| {
                tracing::error!("Failed to persist stroke for '{}': {}", user_id, e);
                ProtocolError::InvalidFormat
            })?;

        self.registry.increment_strokes(&room_id).await;

        self.broadcaster
            .broadcast_to_room(
                &room_id,
                &ServerMessage::StrokeChunkBroadcast { chunk: record },
                Some(conn_id),
            )
            .await;

        reply(
            sender,
            &ServerMessage::CreditsUpdate {
                credits,
                infinite_credits,
            },
        );
        Ok(())
    }

    /// `cheat_code`: one fixed secret grants the volatile unlimited
    /// override for the sender's user.
    async fn handle_cheat_code(
        &self,
        conn_id: &str,
        sender: &FrameSender,
        code: String,
    ) -> Result<(), ProtocolError> {
        let user_id = self
            .registry
            .user_of(conn_id)
            .await
            .ok_or(ProtocolError::NotJoined)?;

        if !code.eq_ignore_ascii_case(credit::CHEAT_CODE) {
            return Err(ProtocolError::InvalidCheatCode);
        }

        self.ledger.grant_unlimited(&user_id).await;
        tracing::info!("Granted unlimited credits to user '{}'", user_id);
        reply(
            sender,
            &ServerMessage::CreditsUpdate {
                credits: None,
                infinite_credits: true,
            },
        );
        Ok(())
    }
}

/// Parse one inbound frame, distinguishing an unrecognized `type` from a
/// payload that does not parse at all (the wire treats both as errors,
/// with different messages).
fn parse_client_message(raw: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidFormat)?;

    let known_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .is_some_and(|t| KNOWN_MESSAGE_TYPES.contains(&t));
    if !known_type {
        return Err(ProtocolError::UnknownMessageType);
    }

    serde_json::from_value(value).map_err(|_| ProtocolError::InvalidFormat)
}

fn reply(sender: &FrameSender, message: &ServerMessage) {
    if sender.send(OutboundFrame::Text(message.to_json())).is_err() {
        tracing::debug!("Reply dropped: connection outbound channel closed");
    }
}
