//! Shared application state injected into every handler.

use std::sync::Arc;

use crate::common::time::Clock;
use crate::service::{ConnectionRegistry, ProtocolHandler, RateLimiter};

pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub protocol: Arc<ProtocolHandler>,
    pub rate_limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}
