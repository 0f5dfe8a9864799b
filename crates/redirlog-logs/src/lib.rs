//! Log processing for redirlog
//!
//! This crate turns raw redirect-service log lines into structured entries,
//! keeps a bounded recent history, and streams new entries to live viewers.

mod classifier;
mod error;
mod hub;
mod ingest;
mod sanitize;
mod session;
mod store;

pub use classifier::{ClassifierConfig, Decision, LineClassifier, RedirectMatch, SuppressReason};
pub use error::SessionError;
pub use hub::{Attachment, BroadcastHub, HubConfig, SessionId};
pub use ingest::{IngestConfig, IngestPump, LogIngestor};
pub use sanitize::{decode_line, escape_html, repair_encoding, strip_ansi};
pub use session::{
    CloseReason, Inbound, Outbound, SessionConfig, SessionState, ViewerSession, ViewerSink,
    ViewerSource,
};
pub use store::{DEFAULT_CAPACITY, EventStore};

// Re-export types used in our public API
pub use redirlog_types::{LogEntry, LogLevel, RedirectEvent, SeverityHint};
