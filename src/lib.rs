//! Real-time collaborative drawing server library.
//!
//! Implements a WebSocket server for a shared drawing surface: room-scoped
//! broadcast of stroke chunks, a per-user credit economy that throttles draw
//! volume, per-connection rate limiting, and periodic compaction of the
//! append-only stroke log into raster snapshots.

// layers
pub mod domain;
pub mod infrastructure;
pub mod service;
pub mod ui;

// shared library
pub mod common;
pub mod config;
