//! Configuration file handling
//!
//! Values come from an optional TOML file; anything missing falls back to
//! the defaults below, and command-line flags override both.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use redirlog_logs::{ClassifierConfig, HubConfig, IngestConfig, SessionConfig};
use redirlog_web::RoutePaths;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the viewer server listens on
    pub bind: SocketAddr,

    /// Number of recent entries kept for replay
    pub capacity: usize,

    /// Upper bound on one delivery to one viewer
    pub send_timeout_ms: u64,

    /// Viewer silence before a liveness probe
    pub probe_interval_ms: u64,

    /// Unanswered probes before a viewer is dropped
    pub max_missed_probes: u32,

    /// Entries queued per viewer
    pub queue_depth: usize,

    /// Classified entries waiting to be published
    pub ingest_queue_depth: usize,

    pub stream_path: String,
    pub snapshot_path: String,

    /// Text frame a viewer may send to answer a probe
    pub probe_reply: String,

    /// Echo service lines that carry nothing important
    pub passthrough_unmatched: bool,

    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8001)),
            capacity: 100,
            send_timeout_ms: 1000,
            probe_interval_ms: 5000,
            max_missed_probes: 2,
            queue_depth: 64,
            ingest_queue_depth: 1024,
            stream_path: "/ws/logs".to_string(),
            snapshot_path: "/api/logs".to_string(),
            probe_reply: "pong".to_string(),
            passthrough_unmatched: false,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject values the subsystem cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            bail!("capacity must be at least 1");
        }
        if self.send_timeout_ms == 0 {
            bail!("send_timeout_ms must be positive");
        }
        if self.probe_interval_ms == 0 {
            bail!("probe_interval_ms must be positive");
        }
        if self.queue_depth == 0 {
            bail!("queue_depth must be at least 1");
        }
        if self.ingest_queue_depth == 0 {
            bail!("ingest_queue_depth must be at least 1");
        }
        for (name, path) in [
            ("stream_path", &self.stream_path),
            ("snapshot_path", &self.snapshot_path),
        ] {
            if !path.starts_with('/') {
                bail!("{} must start with '/', got '{}'", name, path);
            }
        }
        if self.stream_path == self.snapshot_path {
            bail!("stream_path and snapshot_path must differ");
        }
        if self.probe_reply.trim().is_empty() {
            bail!("probe_reply must not be empty");
        }
        Ok(())
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            capacity: self.capacity,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            queue_depth: self.queue_depth,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            max_missed_probes: self.max_missed_probes,
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            classifier: ClassifierConfig {
                stream_path: self.stream_path.clone(),
                snapshot_path: self.snapshot_path.clone(),
            },
            passthrough_unmatched: self.passthrough_unmatched,
            queue_depth: self.ingest_queue_depth,
        }
    }

    pub fn route_paths(&self) -> RoutePaths {
        RoutePaths {
            stream: self.stream_path.clone(),
            snapshot: self.snapshot_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.session_config().probe_interval, Duration::from_secs(5));
        assert_eq!(config.hub_config().send_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            bind = "127.0.0.1:9000"
            capacity = 500
            stream_path = "/live"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.capacity, 500);
        assert_eq!(config.route_paths().stream, "/live");
        assert_eq!(config.ingest_config().classifier.stream_path, "/live");
        assert_eq!(config.snapshot_path, "/api/logs");
        assert_eq!(config.max_missed_probes, 2);
        assert_eq!(config.ingest_config().queue_depth, 1024);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::from_toml("capacty = 5").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream_path = "ws".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.snapshot_path = config.stream_path.clone();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/redirlog.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read config file"));
    }
}
