//! Snapshot compaction: folds the append-only stroke log into a raster
//! checkpoint per room, bounding how much history a newly joined client
//! must replay.
//!
//! Runs on a fixed interval independent of any connection. Every failure
//! inside a tick is caught and logged; the compactor's schedule is never
//! fatal to the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::time::Clock;
use crate::config::SnapshotConfig;
use crate::domain::constants::DEFAULT_ROOM_ID;
use crate::domain::{BlobStore, SnapshotRecord, SnapshotStore, StoreError, StrokeStore};
use crate::service::registry::ConnectionRegistry;
use crate::service::renderer::RasterRenderer;

pub struct SnapshotCompactor {
    registry: Arc<ConnectionRegistry>,
    strokes: Arc<dyn StrokeStore>,
    snapshots: Arc<dyn SnapshotStore>,
    blobs: Arc<dyn BlobStore>,
    /// Absent renderer makes compaction a permanent no-op (a capability,
    /// not an error)
    renderer: Option<Arc<dyn RasterRenderer>>,
    clock: Arc<dyn Clock>,
    config: SnapshotConfig,
    missing_renderer_logged: AtomicBool,
}

impl SnapshotCompactor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        strokes: Arc<dyn StrokeStore>,
        snapshots: Arc<dyn SnapshotStore>,
        blobs: Arc<dyn BlobStore>,
        renderer: Option<Arc<dyn RasterRenderer>>,
        clock: Arc<dyn Clock>,
        config: SnapshotConfig,
    ) -> Self {
        Self {
            registry,
            strokes,
            snapshots,
            blobs,
            renderer,
            clock,
            config,
            missing_renderer_logged: AtomicBool::new(false),
        }
    }

    /// One compaction pass over every room worth considering: rooms with
    /// live connections, or the default room when none are live.
    pub async fn run_tick(&self) {
        let mut rooms = self.registry.active_rooms().await;
        if rooms.is_empty() {
            rooms.push(DEFAULT_ROOM_ID.to_string());
        }

        for room_id in rooms {
            let pending = self.registry.pending_strokes(&room_id).await;
            if pending < self.config.stroke_threshold {
                continue;
            }

            tracing::info!(
                "Triggering snapshot for room '{}' ({} pending strokes)",
                room_id,
                pending
            );
            self.generate_snapshot(&room_id).await;
            // Reset regardless of outcome so a stuck room does not retry
            // every tick.
            self.registry.reset_strokes(&room_id).await;
        }
    }

    /// Produce one snapshot for a room. Returns the raster URL, or None
    /// when no snapshot was produced (failure or absent renderer).
    pub async fn generate_snapshot(&self, room_id: &str) -> Option<String> {
        let Some(renderer) = &self.renderer else {
            if !self.missing_renderer_logged.swap(true, Ordering::SeqCst) {
                tracing::warn!("Raster renderer unavailable; snapshot generation is disabled");
            }
            return None;
        };

        match self.try_generate(renderer.as_ref(), room_id).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::error!("Error generating snapshot for room '{}': {}", room_id, e);
                None
            }
        }
    }

    async fn try_generate(
        &self,
        renderer: &dyn RasterRenderer,
        room_id: &str,
    ) -> Result<String, StoreError> {
        let latest = self.snapshots.latest(room_id).await?;
        let prior_watermark = latest.as_ref().and_then(|s| s.watermark);

        let strokes = self.strokes.strokes_after(room_id, prior_watermark).await?;

        // Prior raster is best effort: a fetch failure falls back to blank.
        let base = match &latest {
            Some(snapshot) => match self.blobs.get(&snapshot.blob_key).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!("Failed to load prior snapshot, continuing without it: {}", e);
                    None
                }
            },
            None => None,
        };

        let png = renderer
            .render(base.as_deref(), &strokes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let now = self.clock.now_millis();
        let key = format!(
            "snapshots/{}/{}-{}.png",
            room_id,
            now,
            uuid::Uuid::new_v4().simple()
        );
        let url = self
            .blobs
            .put(&key, png, "image/png")
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let watermark = strokes.last().map(|s| s.id).or(prior_watermark);
        self.snapshots
            .create(SnapshotRecord {
                room_id: room_id.to_string(),
                blob_key: key,
                url: url.clone(),
                watermark,
                created_at: now,
            })
            .await?;

        tracing::info!("Generated snapshot for room '{}': {}", room_id, url);
        Ok(url)
    }
}
