//! Shared handler state.

use std::sync::Arc;

use redirlog_logs::{BroadcastHub, SessionConfig};

/// State cloned into every handler
#[derive(Clone, Debug)]
pub struct AppState {
    pub hub: BroadcastHub,

    /// Timing for live-stream sessions
    pub session: SessionConfig,

    /// Text frame a viewer may send to answer a probe
    pub probe_reply: Arc<str>,
}

impl AppState {
    pub fn new(hub: BroadcastHub, session: SessionConfig, probe_reply: &str) -> Self {
        Self {
            hub,
            session,
            probe_reply: Arc::from(probe_reply),
        }
    }
}
