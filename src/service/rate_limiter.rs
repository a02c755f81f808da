//! Per-connection fixed-window rate limiting.
//!
//! A soft limiter: a rejection declines the specific action but never
//! closes the connection. State lives only in process memory and is
//! dropped on disconnect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::common::time::Clock;
use crate::domain::constants::rate_limit;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    window_end: i64,
}

/// Fixed-window admission counter keyed by connection id.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    max_per_window: u32,
    state: Mutex<HashMap<String, WindowState>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_max(clock, rate_limit::MAX_STROKES_PER_SECOND)
    }

    pub fn with_max(clock: Arc<dyn Clock>, max_per_window: u32) -> Self {
        Self {
            clock,
            max_per_window,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one action for `connection_id`.
    ///
    /// A fresh or expired window resets to a full allowance. Once the cap
    /// is reached the call is rejected without incrementing further, until
    /// the window rolls over.
    pub async fn admit(&self, connection_id: &str) -> bool {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().await;

        match state.get_mut(connection_id) {
            None => {
                state.insert(
                    connection_id.to_string(),
                    WindowState {
                        count: 1,
                        window_end: now + rate_limit::WINDOW_MS,
                    },
                );
                true
            }
            Some(window) if now > window.window_end => {
                window.count = 1;
                window.window_end = now + rate_limit::WINDOW_MS;
                true
            }
            Some(window) => {
                if window.count >= self.max_per_window {
                    return false;
                }
                window.count += 1;
                true
            }
        }
    }

    /// Clear state for a disconnected connection.
    pub async fn release(&self, connection_id: &str) {
        let mut state = self.state.lock().await;
        state.remove(connection_id);
    }
}
