//! Server configuration read from environment variables.

use std::env;
use std::path::PathBuf;

/// Snapshot compaction settings
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// How often the compaction task runs
    pub interval_ms: u64,
    /// Minimum pending strokes before a room is compacted
    pub stroke_threshold: u64,
}

/// Runtime configuration assembled at startup.
///
/// Every value has a default so the server runs without any environment
/// setup; production deployments override via environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot: SnapshotConfig,
    /// Root directory for the filesystem blob store
    pub blob_dir: PathBuf,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            snapshot: SnapshotConfig {
                interval_ms: env_u64("SNAPSHOT_INTERVAL_MS", 30_000),
                stroke_threshold: env_u64("SNAPSHOT_STROKE_THRESHOLD", 100),
            },
            blob_dir: env::var("BLOB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("snapshots")),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: '{}', using {}", key, value, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        // given: no relevant environment variables set in the test process
        // when:
        let config = Config::from_env();

        // then:
        assert_eq!(config.snapshot.interval_ms, 30_000);
        assert_eq!(config.snapshot.stroke_threshold, 100);
        assert_eq!(config.blob_dir, PathBuf::from("snapshots"));
    }
}
