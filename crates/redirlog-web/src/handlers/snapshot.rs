//! Historical snapshot endpoint.

use axum::Json;
use axum::extract::State;

use redirlog_types::LogEntry;

use crate::state::AppState;

/// Current store contents as a JSON array, oldest first.
pub async fn list(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    let entries = state
        .hub
        .store()
        .snapshot()
        .iter()
        .map(|entry| LogEntry::clone(entry))
        .collect();
    Json(entries)
}
