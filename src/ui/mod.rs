//! Transport layer: the Axum HTTP/WebSocket surface of the server.

pub mod handler;
pub mod server;
pub mod signal;
pub mod state;

pub use server::Server;
pub use state::AppState;
