//! Server startup and graceful shutdown.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::WebError;
use crate::routes::{RoutePaths, create_router};
use crate::state::AppState;

/// Bind `addr` and serve until `shutdown` is cancelled
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    paths: &RoutePaths,
    shutdown: CancellationToken,
) -> Result<(), WebError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| WebError::Bind { addr, source })?;
    serve_listener(listener, state, paths, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    paths: &RoutePaths,
    shutdown: CancellationToken,
) -> Result<(), WebError> {
    let local = listener.local_addr()?;
    info!(addr = %local, stream = %paths.stream, snapshot = %paths.snapshot, "log viewer listening");

    let app = create_router(state, paths);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("log viewer stopped");
    Ok(())
}
