use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while running the viewer server
#[derive(Debug, Error)]
pub enum WebError {
    /// The listen address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
