//! Store traits
//!
//! The domain layer defines the data-access interfaces it needs; concrete
//! implementations live in the infrastructure layer (dependency inversion).
//! The relational and object stores themselves are external collaborators;
//! these traits are the contract the core consumes.

use async_trait::async_trait;

use super::error::{BlobError, StoreError};
use super::model::{SnapshotRecord, StrokeChunk, StrokeRecord};

/// Result of a conditional balance decrement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecrementOutcome {
    /// Decrement applied; carries the new balance
    Applied(i64),
    /// Balance was below the requested amount; nothing changed
    Insufficient,
    /// No record exists for the user; nothing changed
    NotFound,
}

/// Per-user credit rows.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user's balance
    async fn find(&self, user_id: &str) -> Result<Option<i64>, StoreError>;

    /// Create a user record with the given balance; no-op if it exists
    async fn create(&self, user_id: &str, credits: i64) -> Result<(), StoreError>;

    /// Add `amount` to a user's balance, creating the record at
    /// `create_with` + `amount` if absent. Returns the new balance.
    async fn increment(
        &self,
        user_id: &str,
        amount: i64,
        create_with: i64,
    ) -> Result<i64, StoreError>;

    /// Subtract `amount` only if the current balance covers it, as one
    /// atomic store operation (no check-then-act window).
    async fn decrement_if_sufficient(
        &self,
        user_id: &str,
        amount: i64,
    ) -> Result<DecrementOutcome, StoreError>;
}

/// Append-only stroke log.
#[async_trait]
pub trait StrokeStore: Send + Sync {
    /// Persist a chunk for a user, assigning the next stroke id.
    async fn append(
        &self,
        user_id: &str,
        chunk: &StrokeChunk,
        created_at: i64,
    ) -> Result<StrokeRecord, StoreError>;

    /// All strokes for a room with id strictly greater than `after`
    /// (all strokes when `after` is None), ordered by creation time.
    async fn strokes_after(
        &self,
        room_id: &str,
        after: Option<u64>,
    ) -> Result<Vec<StrokeRecord>, StoreError>;
}

/// Snapshot checkpoint records.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn create(&self, snapshot: SnapshotRecord) -> Result<(), StoreError>;

    /// Most recently created snapshot for a room
    async fn latest(&self, room_id: &str) -> Result<Option<SnapshotRecord>, StoreError>;
}

/// Binary object store for raster images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, returning a retrievable URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, BlobError>;

    /// Fetch bytes previously stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
}
