//! Durable-store implementations.

mod memory;

pub use memory::{InMemorySnapshotStore, InMemoryStrokeStore, InMemoryUserStore};
