//! Adapters between axum websocket halves and viewer sessions.
//!
//! | Direction | Frame | Meaning |
//! |---|---|---|
//! | Server → Client | Text | one JSON log entry |
//! | Server → Client | Ping | liveness probe |
//! | Client → Server | Pong, or Text equal to the reply token | probe answer |
//! | Client → Server | any other Text/Binary/Ping | ignored, counts as liveness |
//! | Client → Server | Close | viewer disconnect |

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use redirlog_logs::{Inbound, Outbound, SessionError, ViewerSink, ViewerSource};

/// Encode an outbound frame as a websocket message
pub fn encode_frame(frame: &Outbound) -> Result<Message, SessionError> {
    match frame {
        Outbound::Entry(entry) => {
            let json = serde_json::to_string(entry.as_ref())
                .map_err(|e| SessionError::Encode(e.to_string()))?;
            Ok(Message::Text(json.into()))
        }
        Outbound::Probe => Ok(Message::Ping(Bytes::new())),
    }
}

/// Map an inbound websocket message to a session signal
pub fn decode_message(message: &Message, probe_reply: &str) -> Inbound {
    match message {
        Message::Close(_) => Inbound::Close,
        Message::Pong(_) => Inbound::ProbeReply,
        Message::Text(text) if text.as_str().trim() == probe_reply => Inbound::ProbeReply,
        _ => Inbound::Message,
    }
}

/// Sending half of a viewer websocket
pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self { sender }
    }
}

impl ViewerSink for WsSink {
    fn send(&mut self, frame: Outbound) -> impl Future<Output = Result<(), SessionError>> + Send {
        async move {
            let message = encode_frame(&frame)?;
            self.sender
                .send(message)
                .await
                .map_err(|e| SessionError::SendFailed(e.to_string()))
        }
    }
}

/// Receiving half of a viewer websocket
pub struct WsSource {
    receiver: SplitStream<WebSocket>,
    probe_reply: Arc<str>,
}

impl WsSource {
    pub fn new(receiver: SplitStream<WebSocket>, probe_reply: Arc<str>) -> Self {
        Self {
            receiver,
            probe_reply,
        }
    }
}

impl ViewerSource for WsSource {
    fn recv(&mut self) -> impl Future<Output = Option<Inbound>> + Send {
        async move {
            match self.receiver.next().await {
                Some(Ok(message)) => Some(decode_message(&message, &self.probe_reply)),
                // Protocol error or network drop
                Some(Err(_)) | None => None,
            }
        }
    }
}
