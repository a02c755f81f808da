//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{service::OutboundFrame, ui::state::AppState};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that receives outbound frames from the rx channel and
/// pushes them to the WebSocket sender.
///
/// A close frame ends the task after being flushed, which tears down the
/// connection through the select in [`handle_socket`].
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                OutboundFrame::Text(json) => sender.send(Message::Text(json.into())).await,
                OutboundFrame::Ping => sender.send(Message::Ping(Bytes::new())).await,
                OutboundFrame::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4().to_string();

    // Create a channel for this connection's outbound frames
    let (tx, rx) = mpsc::unbounded_channel();
    state
        .registry
        .register(&conn_id, tx.clone(), state.clock.now_millis())
        .await;
    tracing::info!("Connection '{}' established", conn_id);

    let (sender, mut receiver) = socket.split();
    let mut send_task = pusher_loop(rx, sender);

    let recv_state = state.clone();
    let recv_conn_id = conn_id.clone();

    // Receive messages from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("WebSocket error on '{}': {}", recv_conn_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    recv_state
                        .protocol
                        .handle_raw(&recv_conn_id, &tx, &text)
                        .await;
                }
                Message::Pong(_) => {
                    recv_state.registry.mark_alive(&recv_conn_id).await;
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", recv_conn_id);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Cleanup is idempotent: the registry entry may already be gone if this
    // connection was evicted by a duplicate join or a missed heartbeat.
    state.registry.leave(&conn_id).await;
    state.rate_limiter.release(&conn_id).await;
    tracing::info!("Connection '{}' closed", conn_id);
}
