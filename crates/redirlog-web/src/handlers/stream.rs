//! Live-stream websocket endpoint.
//!
//! Each upgraded connection becomes one viewer session: the current
//! snapshot first, then every new entry as it is published.

use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::debug;

use redirlog_logs::ViewerSession;

use crate::state::AppState;
use crate::ws::{WsSink, WsSource};

pub async fn live(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_live(socket, state))
}

async fn handle_live(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    let session = ViewerSession::new(
        state.hub.clone(),
        WsSink::new(sender),
        WsSource::new(receiver, state.probe_reply.clone()),
        state.session.clone(),
    );
    let reason = session.run().await;
    debug!(?reason, "live stream connection finished");
}
