//! Service layer: the core components of the drawing server.
//!
//! - [`rate_limiter`]: fixed-window admission counter per connection
//! - [`credits`]: per-user economic balance (spend, earn, override)
//! - [`registry`]: room membership and single-session enforcement
//! - [`broadcaster`]: room-scoped message fan-out
//! - [`protocol`]: the inbound message state machine
//! - [`renderer`]: raster replay of stroke polylines
//! - [`snapshot`]: compaction of the stroke log into raster checkpoints
//! - [`heartbeat`]: liveness sweep and gradual credit earning

pub mod broadcaster;
pub mod credits;
pub mod heartbeat;
pub mod protocol;
pub mod rate_limiter;
pub mod registry;
pub mod renderer;
pub mod snapshot;

pub use broadcaster::Broadcaster;
pub use credits::{Balance, CreditLedger, EarnResult, SpendOutcome};
pub use heartbeat::Heartbeat;
pub use protocol::ProtocolHandler;
pub use rate_limiter::RateLimiter;
pub use registry::{ConnectionId, ConnectionRegistry, FrameSender, OutboundFrame};
pub use renderer::{PixelRenderer, RasterRenderer};
pub use snapshot::SnapshotCompactor;
