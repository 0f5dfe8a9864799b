//! Route definitions and router construction.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Where the two viewer endpoints are mounted
#[derive(Clone, Debug)]
pub struct RoutePaths {
    pub stream: String,
    pub snapshot: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            stream: "/ws/logs".to_string(),
            snapshot: "/api/logs".to_string(),
        }
    }
}

/// Build the application router with state applied
pub fn create_router(state: AppState, paths: &RoutePaths) -> Router {
    Router::new()
        .route(&paths.snapshot, get(handlers::snapshot::list))
        .route(&paths.stream, get(handlers::stream::live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
