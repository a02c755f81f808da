//! In-memory durable-store implementations.
//!
//! `HashMap`s behind a `tokio::sync::Mutex` stand in for the external
//! relational store. The trait methods express exactly the operations the
//! core needs (find-unique, create, increment-upsert, conditional
//! decrement, ordered range scans), so a DBMS-backed implementation can
//! replace these without touching the service layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    DecrementOutcome, SnapshotRecord, SnapshotStore, StoreError, StrokeChunk, StrokeRecord,
    StrokeStore, UserStore,
};

/// In-memory user credit rows.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, i64>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find(&self, user_id: &str) -> Result<Option<i64>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.get(user_id).copied())
    }

    async fn create(&self, user_id: &str, credits: i64) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        users.entry(user_id.to_string()).or_insert(credits);
        Ok(())
    }

    async fn increment(
        &self,
        user_id: &str,
        amount: i64,
        create_with: i64,
    ) -> Result<i64, StoreError> {
        let mut users = self.users.lock().await;
        let balance = users
            .entry(user_id.to_string())
            .and_modify(|credits| *credits += amount)
            .or_insert(create_with + amount);
        Ok(*balance)
    }

    async fn decrement_if_sufficient(
        &self,
        user_id: &str,
        amount: i64,
    ) -> Result<DecrementOutcome, StoreError> {
        let mut users = self.users.lock().await;
        match users.get_mut(user_id) {
            None => Ok(DecrementOutcome::NotFound),
            Some(credits) if *credits < amount => Ok(DecrementOutcome::Insufficient),
            Some(credits) => {
                *credits -= amount;
                Ok(DecrementOutcome::Applied(*credits))
            }
        }
    }
}

/// In-memory append-only stroke log.
pub struct InMemoryStrokeStore {
    strokes: Mutex<Vec<StrokeRecord>>,
    next_id: AtomicU64,
}

impl InMemoryStrokeStore {
    pub fn new() -> Self {
        Self {
            strokes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryStrokeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrokeStore for InMemoryStrokeStore {
    async fn append(
        &self,
        user_id: &str,
        chunk: &StrokeChunk,
        created_at: i64,
    ) -> Result<StrokeRecord, StoreError> {
        let record = StrokeRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id: user_id.to_string(),
            room_id: chunk.room_id.clone(),
            points: chunk.points.clone(),
            color: chunk.color.clone(),
            size: chunk.size,
            opacity: chunk.opacity,
            created_at,
        };
        let mut strokes = self.strokes.lock().await;
        strokes.push(record.clone());
        Ok(record)
    }

    async fn strokes_after(
        &self,
        room_id: &str,
        after: Option<u64>,
    ) -> Result<Vec<StrokeRecord>, StoreError> {
        let strokes = self.strokes.lock().await;
        let mut result: Vec<StrokeRecord> = strokes
            .iter()
            .filter(|s| s.room_id == room_id && after.map_or(true, |id| s.id > id))
            .cloned()
            .collect();
        result.sort_by_key(|s| (s.created_at, s.id));
        Ok(result)
    }
}

/// In-memory snapshot checkpoint records.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<Vec<SnapshotRecord>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn create(&self, snapshot: SnapshotRecord) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.lock().await;
        snapshots.push(snapshot);
        Ok(())
    }

    async fn latest(&self, room_id: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        let snapshots = self.snapshots.lock().await;
        Ok(snapshots
            .iter()
            .filter(|s| s.room_id == room_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}
