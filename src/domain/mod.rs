//! Domain layer: value types, wire protocol, error taxonomy, and the store
//! traits the infrastructure layer implements (dependency inversion).

pub mod constants;
pub mod error;
pub mod message;
pub mod model;
pub mod store;

pub use error::{BlobError, ProtocolError, RenderError, StoreError};
pub use message::{ClientMessage, ServerMessage};
pub use model::{Point, SnapshotRecord, StrokeChunk, StrokeRecord};
pub use store::{BlobStore, DecrementOutcome, SnapshotStore, StrokeStore, UserStore};
