//! Core data model: points, stroke chunks, persisted strokes, snapshots.

use serde::{Deserialize, Serialize};

use super::constants::drawing;
use super::error::ProtocolError;

/// A single drawn point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Client-side capture time, carried through but not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// A batch of consecutive drawn points sent as one message.
///
/// The unit of persistence and of credit charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeChunk {
    pub points: Vec<Point>,
    /// Hex color string, e.g. "#ff8800" or "#f80"
    pub color: String,
    /// Brush size in pixels
    pub size: f64,
    /// 0.0..=1.0
    pub opacity: f64,
    pub room_id: String,
}

impl StrokeChunk {
    /// Validate the chunk against canvas bounds and configured ranges.
    ///
    /// Any violation is reported to the sender and the chunk is dropped.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.points.is_empty() || self.points.len() > drawing::MAX_POINTS_PER_CHUNK {
            return Err(ProtocolError::InvalidStrokeChunk);
        }
        if !is_valid_hex_color(&self.color) {
            return Err(ProtocolError::InvalidStrokeChunk);
        }
        if self.size < drawing::MIN_BRUSH_SIZE || self.size > drawing::MAX_BRUSH_SIZE {
            return Err(ProtocolError::InvalidStrokeChunk);
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ProtocolError::InvalidStrokeChunk);
        }
        for point in &self.points {
            if !point.x.is_finite() || !point.y.is_finite() {
                return Err(ProtocolError::InvalidStrokeChunk);
            }
            if point.x < 0.0 || point.x > drawing::CANVAS_WIDTH as f64 {
                return Err(ProtocolError::InvalidStrokeChunk);
            }
            if point.y < 0.0 || point.y > drawing::CANVAS_HEIGHT as f64 {
                return Err(ProtocolError::InvalidStrokeChunk);
            }
        }
        Ok(())
    }
}

/// A persisted stroke. Append-only: never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeRecord {
    /// Monotonically increasing identifier; defines per-room replay order
    pub id: u64,
    pub user_id: String,
    pub room_id: String,
    pub points: Vec<Point>,
    pub color: String,
    pub size: f64,
    pub opacity: f64,
    /// Unix milliseconds
    pub created_at: i64,
}

/// A raster checkpoint folding the stroke log up to `watermark`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub room_id: String,
    /// Key under which the raster lives in the blob store
    pub blob_key: String,
    /// Retrievable URL returned by the blob store
    pub url: String,
    /// Highest stroke id folded into the raster; None if the raster
    /// was produced before any stroke existed
    pub watermark: Option<u64>,
    /// Unix milliseconds
    pub created_at: i64,
}

/// Check that a string is a well-formed `#rgb` or `#rrggbb` hex color.
pub fn is_valid_hex_color(color: &str) -> bool {
    let Some(digits) = color.strip_prefix('#') else {
        return false;
    };
    (digits.len() == 3 || digits.len() == 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}
