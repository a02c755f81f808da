use std::sync::Arc;

use clap::Parser;

use rakugaki::common::logger::setup_logger;
use rakugaki::common::time::SystemClock;
use rakugaki::config::Config;
use rakugaki::infrastructure::blob::FsBlobStore;
use rakugaki::infrastructure::store::{
    InMemorySnapshotStore, InMemoryStrokeStore, InMemoryUserStore,
};
use rakugaki::service::{
    ConnectionRegistry, CreditLedger, Heartbeat, PixelRenderer, ProtocolHandler, RateLimiter,
    RasterRenderer, SnapshotCompactor,
};
use rakugaki::ui::{AppState, Server};

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time collaborative drawing server")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    setup_logger("server", "info");

    let config = Config::from_env();
    tracing::info!("Starting with config: {:?}", config);

    let clock = Arc::new(SystemClock);
    let registry = Arc::new(ConnectionRegistry::new());
    let users = Arc::new(InMemoryUserStore::new());
    let strokes = Arc::new(InMemoryStrokeStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let blobs = Arc::new(FsBlobStore::new(config.blob_dir.clone()));

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
    let heartbeat = Arc::new(Heartbeat::new(
        registry.clone(),
        ledger,
        rate_limiter.clone(),
        clock.clone(),
    ));
    let renderer: Arc<dyn RasterRenderer> = Arc::new(PixelRenderer::new());
    let compactor = Arc::new(SnapshotCompactor::new(
        registry.clone(),
        strokes,
        snapshots,
        blobs,
        Some(renderer),
        clock.clone(),
        config.snapshot.clone(),
    ));

    let state = Arc::new(AppState {
        registry,
        protocol,
        rate_limiter,
        clock,
    });

    Server::new(state, heartbeat, compactor, config.snapshot.interval_ms)
        .run(&args.host, args.port)
        .await
}
