//! Protocol constants shared by the credit economy, validation, and the
//! snapshot renderer. Values mirror what connected clients assume.

/// Credit economy
pub mod credit {
    /// Balance assigned to a user the first time they are observed
    pub const STARTING_CREDITS: i64 = 500;
    /// Credits earned per connected second (500 credits over ~5 minutes)
    pub const EARN_RATE_PER_SECOND: f64 = 1.67;
    /// How often the heartbeat awards gradual credits
    pub const EARN_CHECK_INTERVAL_MS: u64 = 1000;
    /// Credits charged per drawn point
    pub const COST_PER_POINT: i64 = 1;
    /// Case-insensitive code granting unlimited credits
    pub const CHEAT_CODE: &str = "lactosetolerant";
}

/// Drawing surface
pub mod drawing {
    pub const CANVAS_WIDTH: u32 = 1600;
    pub const CANVAS_HEIGHT: u32 = 900;
    pub const MAX_POINTS_PER_CHUNK: usize = 50;
    pub const MIN_BRUSH_SIZE: f64 = 1.0;
    pub const MAX_BRUSH_SIZE: f64 = 100.0;
}

/// Per-connection admission limits
pub mod rate_limit {
    /// Maximum stroke chunks admitted per window
    pub const MAX_STROKES_PER_SECOND: u32 = 10;
    /// Fixed window length
    pub const WINDOW_MS: i64 = 1000;
}

/// Room every connection belongs to until it joins somewhere else
pub const DEFAULT_ROOM_ID: &str = "global";
