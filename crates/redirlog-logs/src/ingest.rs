use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use redirlog_types::{LogEntry, LogLevel, SeverityHint};

use crate::classifier::{ClassifierConfig, Decision, LineClassifier, SuppressReason};
use crate::hub::BroadcastHub;
use crate::sanitize::{escape_html, strip_ansi};

/// Ingestion settings
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub classifier: ClassifierConfig,

    /// Echo lines without any important keyword instead of swallowing them
    pub passthrough_unmatched: bool,

    /// Entries waiting for the hub before new ones are dropped
    pub queue_depth: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            passthrough_unmatched: false,
            queue_depth: 1024,
        }
    }
}

/// Entry point for raw log lines from the host process.
///
/// Classification runs synchronously on the caller; emitted entries are
/// queued to a single pump task so they reach the hub in arrival order.
/// When the queue is full the newest entry is dropped.
#[derive(Clone)]
pub struct LogIngestor {
    classifier: Arc<LineClassifier>,
    tx: mpsc::Sender<LogEntry>,
    passthrough_unmatched: bool,
}

/// Handle to the task feeding the hub
pub struct IngestPump {
    /// Cancellation token for stopping the pump
    cancel: CancellationToken,

    task: Option<JoinHandle<()>>,
}

impl LogIngestor {
    /// Create an ingestor and start its pump on the current runtime
    pub fn spawn(hub: BroadcastHub, config: &IngestConfig) -> Result<(Self, IngestPump), regex::Error> {
        let classifier = Arc::new(LineClassifier::new(&config.classifier)?);
        let (tx, mut rx) = mpsc::channel::<LogEntry>(config.queue_depth.max(1));
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,

                        entry = rx.recv() => {
                            let Some(entry) = entry else {
                                // Every ingestor handle is gone
                                break;
                            };
                            if hub.publish(entry).await.is_none() {
                                break;
                            }
                        }
                    }
                }
                debug!("ingest pump stopped");
            })
        };

        let ingestor = Self {
            classifier,
            tx,
            passthrough_unmatched: config.passthrough_unmatched,
        };
        let pump = IngestPump {
            cancel,
            task: Some(task),
        };
        Ok((ingestor, pump))
    }

    /// Handle one raw line.
    ///
    /// Returns `true` when the line was handled and should not appear in the
    /// host's normal output, `false` when it should pass through unmodified.
    pub fn observe(&self, raw: &str, hint: SeverityHint) -> bool {
        let decision = catch_unwind(AssertUnwindSafe(|| self.classifier.classify(raw, hint)))
            .unwrap_or_else(|_| {
                warn!("line classifier panicked, line suppressed");
                Decision::Suppress(SuppressReason::Failed)
            });

        match decision {
            Decision::Emit(entry) => {
                self.enqueue(entry);
                true
            }
            Decision::Suppress(SuppressReason::Unimportant) => !self.passthrough_unmatched,
            Decision::Suppress(_) => true,
        }
    }

    /// Handle one raw line, reading the severity from its `LEVEL:` prefix
    pub fn observe_line(&self, raw: &str) -> bool {
        let plain = strip_ansi(raw);
        let (hint, _) = SeverityHint::from_line_prefix(&plain);
        self.observe(raw, hint.unwrap_or_default())
    }

    /// Store a message that originates from the host itself, bypassing classification
    pub fn record(&self, message: &str, level: LogLevel) {
        self.enqueue(LogEntry::new(escape_html(message), level));
    }

    fn enqueue(&self, entry: LogEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                warn!(message = %entry.message, "ingest queue full, entry dropped");
            }
            Err(TrySendError::Closed(_)) => debug!("ingest pump gone, entry dropped"),
        }
    }
}

impl std::fmt::Debug for LogIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIngestor")
            .field("classifier", &self.classifier)
            .field("passthrough_unmatched", &self.passthrough_unmatched)
            .finish()
    }
}

impl IngestPump {
    /// Stop the pump; queued entries that were not yet published are dropped
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Wait until every ingestor handle is dropped and the queue is drained
    pub async fn drain(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for IngestPump {
    fn drop(&mut self) {
        self.stop();
    }
}
