//! Server assembly: the router, the background task schedule, and the
//! accept loop with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::domain::constants::credit::EARN_CHECK_INTERVAL_MS;
use crate::service::{Heartbeat, SnapshotCompactor};
use crate::ui::handler::{http::health_check, websocket::websocket_handler};
use crate::ui::signal::shutdown_signal;
use crate::ui::state::AppState;

pub struct Server {
    state: Arc<AppState>,
    heartbeat: Arc<Heartbeat>,
    compactor: Arc<SnapshotCompactor>,
    snapshot_interval_ms: u64,
}

impl Server {
    pub fn new(
        state: Arc<AppState>,
        heartbeat: Arc<Heartbeat>,
        compactor: Arc<SnapshotCompactor>,
        snapshot_interval_ms: u64,
    ) -> Self {
        Self {
            state,
            heartbeat,
            compactor,
            snapshot_interval_ms,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(websocket_handler))
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind, start the background tasks, and serve until a shutdown signal.
    pub async fn run(self, host: &str, port: u16) -> std::io::Result<()> {
        let heartbeat = self.heartbeat.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(EARN_CHECK_INTERVAL_MS));
            loop {
                ticker.tick().await;
                heartbeat.tick().await;
            }
        });

        let compactor = self.compactor.clone();
        let interval_ms = self.snapshot_interval_ms;
        let compaction_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            // The first interval tick fires immediately; skip it so the
            // compactor never runs before any stroke could have arrived.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                compactor.run_tick().await;
            }
        });

        let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        heartbeat_task.abort();
        compaction_task.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time::SystemClock;
    use crate::config::SnapshotConfig;
    use crate::infrastructure::blob::FsBlobStore;
    use crate::infrastructure::store::{
        InMemorySnapshotStore, InMemoryStrokeStore, InMemoryUserStore,
    };
    use crate::service::{
        ConnectionRegistry, CreditLedger, ProtocolHandler, RateLimiter,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn server() -> Server {
        let registry = Arc::new(ConnectionRegistry::new());
        let users = Arc::new(InMemoryUserStore::new());
        let strokes = Arc::new(InMemoryStrokeStore::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let clock = Arc::new(SystemClock);
        let rate_limiter = Arc::new(RateLimiter::new(clock.clone()));
        let ledger = Arc::new(CreditLedger::new(users));
        let protocol = Arc::new(ProtocolHandler::new(
            registry.clone(),
            rate_limiter.clone(),
            ledger.clone(),
            strokes.clone(),
            snapshots.clone(),
            clock.clone(),
        ));
        let blob_dir =
            std::env::temp_dir().join(format!("rakugaki-server-{}", uuid::Uuid::new_v4()));
        let compactor = Arc::new(SnapshotCompactor::new(
            registry.clone(),
            strokes,
            snapshots,
            Arc::new(FsBlobStore::new(blob_dir)),
            None,
            clock.clone(),
            SnapshotConfig {
                interval_ms: 30_000,
                stroke_threshold: 100,
            },
        ));
        let heartbeat = Arc::new(Heartbeat::new(
            registry.clone(),
            ledger,
            rate_limiter.clone(),
            clock.clone(),
        ));
        let state = Arc::new(AppState {
            registry,
            protocol,
            rate_limiter,
            clock,
        });
        Server::new(state, heartbeat, compactor, 30_000)
    }

    #[tokio::test]
    async fn test_health_endpoint_responds_ok() {
        // given:
        let router = server().router();

        // when:
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // then:
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_websocket_route_rejects_plain_http() {
        // given:
        let router = server().router();

        // when: a GET without the upgrade handshake headers
        let response = router
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // then:
        assert_ne!(response.status(), StatusCode::OK);
    }
}
