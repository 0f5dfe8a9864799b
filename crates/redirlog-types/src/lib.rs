//! Shared types for redirlog
//!
//! This crate contains data structures used across multiple redirlog crates.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Timestamp format used on the wire (second resolution, local time)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Log Types
// ============================================================================

/// Display level of a stored log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    /// Lowercase name, as it appears in the JSON wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity the host's logger attached to a raw line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum SeverityHint {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl SeverityHint {
    /// Parse a severity name from common formats
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" | "trc" => Some(Self::Trace),
            "debug" | "dbg" => Some(Self::Debug),
            "info" | "inf" | "information" => Some(Self::Info),
            "warn" | "warning" | "wrn" => Some(Self::Warning),
            "error" | "err" => Some(Self::Error),
            "critical" | "crit" | "fatal" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Detect the `LEVEL:` prefix uvicorn-style loggers put in front of a line.
    ///
    /// Returns the hint and the remainder of the line after the prefix.
    pub fn from_line_prefix(line: &str) -> (Option<Self>, &str) {
        let trimmed = line.trim_start();
        if let Some((head, rest)) = trimmed.split_once(':') {
            // Level names are short; anything longer is a message containing a colon
            if head.len() <= 8 && !head.contains(' ') {
                if let Some(hint) = Self::from_name(head) {
                    return (Some(hint), rest.trim_start());
                }
            }
        }
        (None, line)
    }

    pub fn is_error(&self) -> bool {
        *self >= Self::Error
    }
}

/// A single structured log entry, immutable once created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Creation time, second resolution
    pub timestamp: String,

    /// Cleaned, HTML-safe message
    pub message: String,

    /// Display level
    #[serde(default)]
    pub level: LogLevel,
}

impl LogEntry {
    /// Create an entry stamped with the current local time
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            message: message.into(),
            level,
        }
    }

    /// Create an info-level entry
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, LogLevel::Info)
    }
}

/// A successfully parsed redirect access-log line
#[derive(Clone, Debug, PartialEq)]
pub struct RedirectEvent {
    /// Source IP of the redirect request
    pub client_address: String,

    /// Percent-decoded URL path of the redirected resource
    pub target_path: String,

    /// Service time in milliseconds
    pub duration_ms: f64,
}

impl RedirectEvent {
    /// Human-readable message for this redirect
    pub fn message(&self) -> String {
        format!(
            "302 redirect [{}]: {} ({} ms)",
            self.client_address, self.target_path, self.duration_ms
        )
    }
}
