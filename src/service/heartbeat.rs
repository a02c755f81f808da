//! Liveness sweep and gradual credit earning.
//!
//! One periodic tick pings every open connection, force-closes those that
//! missed the previous ping, and awards elapsed-time credits to joined
//! connections, pushing a `credits_update` when anything was earned.

use std::sync::Arc;

use crate::common::time::Clock;
use crate::domain::ServerMessage;
use crate::service::credits::CreditLedger;
use crate::service::rate_limiter::RateLimiter;
use crate::service::registry::{
    ConnectionRegistry, HEARTBEAT_CLOSE_CODE, OutboundFrame,
};

pub struct Heartbeat {
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<CreditLedger>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl Heartbeat {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        ledger: Arc<CreditLedger>,
        rate_limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            ledger,
            rate_limiter,
            clock,
        }
    }

    /// One heartbeat pass.
    pub async fn tick(&self) {
        let now = self.clock.now_millis();
        let (dead, due) = self.registry.sweep(now).await;

        for conn in dead {
            tracing::info!(
                "Connection '{}' missed heartbeat, closing",
                conn.connection_id
            );
            let _ = conn.sender.send(OutboundFrame::Close {
                code: HEARTBEAT_CLOSE_CODE,
                reason: "heartbeat timeout",
            });
            // The registry already dropped it; clear the limiter state the
            // socket epilogue would normally release.
            self.rate_limiter.release(&conn.connection_id).await;
        }

        // Ping the survivors.
        for (conn_id, sender) in self.registry.all_senders().await {
            if sender.send(OutboundFrame::Ping).is_err() {
                tracing::debug!("Failed to ping connection '{}'", conn_id);
            }
        }

        // Award gradual credits.
        for earn in due {
            match self.ledger.earn(&earn.user_id, earn.seconds_elapsed).await {
                Ok(result) if result.awarded > 0 => {
                    let (credits, infinite_credits) = result.balance.as_wire();
                    let update = ServerMessage::CreditsUpdate {
                        credits,
                        infinite_credits,
                    };
                    let _ = earn.sender.send(OutboundFrame::Text(update.to_json()));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Failed to award credits to '{}': {}", earn.user_id, e);
                }
            }
        }
    }
}
