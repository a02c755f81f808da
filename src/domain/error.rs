//! Error taxonomy.
//!
//! Every failure in the core is local and recoverable: validation and
//! admission failures become `error` replies to the offending sender, store
//! and blob failures are logged and yield empty results. Nothing here
//! terminates the process.

use thiserror::Error;

/// Failures of the durable store collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Failures of the blob store collaborator.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob write failed for key '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("blob read failed for key '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid blob key '{0}'")]
    InvalidKey(String),
}

/// Failures of the raster renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode raster: {0}")]
    Encode(String),
}

/// Per-message failures reported back to the sending client.
///
/// The wire never distinguishes a parse failure from a validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Invalid join message")]
    InvalidJoin,
    #[error("Invalid stroke chunk")]
    InvalidStrokeChunk,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Room mismatch")]
    RoomMismatch,
    #[error("Insufficient credits")]
    InsufficientCredits,
    #[error("Join a room first")]
    NotJoined,
    #[error("Invalid cheat code")]
    InvalidCheatCode,
    #[error("Unknown message type")]
    UnknownMessageType,
    #[error("Invalid message format")]
    InvalidFormat,
}

impl ProtocolError {
    /// The `error` reply sent to the offending client.
    pub fn to_client_message(&self) -> crate::domain::ServerMessage {
        crate::domain::ServerMessage::Error {
            message: self.to_string(),
        }
    }
}
