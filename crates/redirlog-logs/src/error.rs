use thiserror::Error;

/// Errors raised by viewer sessions and the broadcast hub
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying connection rejected a frame
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The frame could not be encoded for the wire
    #[error("encode failed: {0}")]
    Encode(String),

    /// The hub no longer accepts sessions
    #[error("broadcast hub is shut down")]
    HubShutDown,
}
