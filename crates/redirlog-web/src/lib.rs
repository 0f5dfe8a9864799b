//! Web endpoints for redirlog
//!
//! Serves the historical snapshot as JSON and the live stream over a
//! websocket, both backed by the shared [`redirlog_logs::BroadcastHub`].

mod error;
pub mod handlers;
mod routes;
mod server;
mod state;
pub mod ws;

pub use error::WebError;
pub use routes::{RoutePaths, create_router};
pub use server::{serve, serve_listener};
pub use state::AppState;
