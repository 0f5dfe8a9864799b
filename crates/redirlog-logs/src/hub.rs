use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use redirlog_types::LogEntry;

use crate::error::SessionError;
use crate::store::{DEFAULT_CAPACITY, EventStore};

/// Tuning for the broadcast hub
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Event store capacity
    pub capacity: usize,

    /// Upper bound on a single delivery to one session
    pub send_timeout: Duration,

    /// Entries queued per session before a send has to wait
    pub queue_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            send_timeout: Duration::from_secs(1),
            queue_depth: 64,
        }
    }
}

/// Identity of one attached viewer session, never reused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

/// Everything a freshly attached session needs
#[derive(Debug)]
pub struct Attachment {
    pub id: SessionId,

    /// Store snapshot taken at attach time, oldest first
    pub backlog: Vec<Arc<LogEntry>>,

    /// Live entries published after the snapshot
    pub entries: mpsc::Receiver<Arc<LogEntry>>,

    /// Cancelled when the hub detaches this session or shuts down
    pub cancel: CancellationToken,
}

struct SessionSlot {
    tx: mpsc::Sender<Arc<LogEntry>>,
    cancel: CancellationToken,
}

struct HubInner {
    store: EventStore,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    /// Serializes publish and attach so every session sees store order
    publish_lock: Mutex<()>,
    next_id: AtomicU64,
    send_timeout: Duration,
    queue_depth: usize,
    shutdown: CancellationToken,
}

/// Fans out published entries to every attached viewer session
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub owning a fresh event store
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store: EventStore::new(config.capacity),
                sessions: RwLock::new(HashMap::new()),
                publish_lock: Mutex::new(()),
                next_id: AtomicU64::new(0),
                send_timeout: config.send_timeout,
                queue_depth: config.queue_depth.max(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The store backing this hub
    pub fn store(&self) -> &EventStore {
        &self.inner.store
    }

    pub fn send_timeout(&self) -> Duration {
        self.inner.send_timeout
    }

    /// Register a new session.
    ///
    /// The returned backlog is exactly the store contents at registration;
    /// every entry published afterwards arrives through `entries`.
    pub async fn attach(&self) -> Result<Attachment, SessionError> {
        let _guard = self.inner.publish_lock.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(SessionError::HubShutDown);
        }

        let id = SessionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, entries) = mpsc::channel(self.inner.queue_depth);
        let cancel = self.inner.shutdown.child_token();

        self.inner.sessions.write().insert(
            id,
            SessionSlot {
                tx,
                cancel: cancel.clone(),
            },
        );
        let backlog = self.inner.store.snapshot();

        info!(session = %id, backlog = backlog.len(), "viewer attached");

        Ok(Attachment {
            id,
            backlog,
            entries,
            cancel,
        })
    }

    /// Append an entry to the store and deliver it to every session.
    ///
    /// Each delivery waits at most the send timeout; sessions that time out
    /// or have gone away are detached. Returns the entry's sequence number,
    /// or `None` once the hub is shut down.
    pub async fn publish(&self, entry: LogEntry) -> Option<u64> {
        let _guard = self.inner.publish_lock.lock().await;
        if self.inner.shutdown.is_cancelled() {
            debug!(message = %entry.message, "hub shut down, entry dropped");
            return None;
        }

        let entry = Arc::new(entry);
        let seq = self.inner.store.append(Arc::clone(&entry));

        let targets: Vec<(SessionId, mpsc::Sender<Arc<LogEntry>>)> = self
            .inner
            .sessions
            .read()
            .iter()
            .map(|(id, slot)| (*id, slot.tx.clone()))
            .collect();

        for (id, tx) in targets {
            match tokio::time::timeout(self.inner.send_timeout, tx.send(Arc::clone(&entry))).await
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    debug!(session = %id, "session queue closed");
                    self.detach(id);
                }
                Err(_) => {
                    warn!(session = %id, "delivery timed out, dropping viewer");
                    self.detach(id);
                }
            }
        }

        Some(seq)
    }

    /// Remove a session. Safe to call any number of times.
    pub fn detach(&self, id: SessionId) -> bool {
        let removed = self.inner.sessions.write().remove(&id);
        match removed {
            Some(slot) => {
                slot.cancel.cancel();
                debug!(session = %id, "viewer detached");
                true
            }
            None => false,
        }
    }

    /// Number of attached sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Ids of the attached sessions, oldest first
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_attached(&self, id: SessionId) -> bool {
        self.inner.sessions.read().contains_key(&id)
    }

    /// Detach every session and refuse new ones
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained: Vec<_> = self.inner.sessions.write().drain().collect();
        for (_, slot) in &drained {
            slot.cancel.cancel();
        }
        info!(sessions = drained.len(), "broadcast hub shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolves once the hub is shut down
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("store", &self.inner.store)
            .field("sessions", &self.session_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(capacity: usize, queue_depth: usize) -> BroadcastHub {
        BroadcastHub::new(HubConfig {
            capacity,
            send_timeout: Duration::from_secs(1),
            queue_depth,
        })
    }

    fn messages(entries: &[Arc<LogEntry>]) -> Vec<String> {
        entries.iter().map(|e| e.message.clone()).collect()
    }

    #[tokio::test]
    async fn test_attach_gets_snapshot_then_live_entries() {
        let hub = hub(3, 16);
        for n in 0..5 {
            hub.publish(LogEntry::info(format!("old {}", n))).await;
        }

        let mut attachment = hub.attach().await.unwrap();
        assert_eq!(
            messages(&attachment.backlog),
            messages(&hub.store().snapshot())
        );
        assert_eq!(messages(&attachment.backlog), vec!["old 2", "old 3", "old 4"]);

        hub.publish(LogEntry::info("new 0")).await;
        hub.publish(LogEntry::info("new 1")).await;
        assert_eq!(attachment.entries.recv().await.unwrap().message, "new 0");
        assert_eq!(attachment.entries.recv().await.unwrap().message, "new 1");
    }

    #[tokio::test]
    async fn test_sessions_share_publish_order() {
        let hub = hub(100, 64);
        let mut a = hub.attach().await.unwrap();
        let mut b = hub.attach().await.unwrap();
        assert_ne!(a.id, b.id);

        for n in 0..10 {
            hub.publish(LogEntry::info(n.to_string())).await;
        }
        for n in 0..10 {
            assert_eq!(a.entries.recv().await.unwrap().message, n.to_string());
            assert_eq!(b.entries.recv().await.unwrap().message, n.to_string());
        }
    }

    #[tokio::test]
    async fn test_closed_session_is_pruned() {
        let hub = hub(10, 4);
        let gone = hub.attach().await.unwrap();
        let mut alive = hub.attach().await.unwrap();
        let gone_id = gone.id;
        drop(gone);

        hub.publish(LogEntry::info("x")).await;
        assert!(!hub.is_attached(gone_id));
        assert!(hub.is_attached(alive.id));
        assert_eq!(alive.entries.recv().await.unwrap().message, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_session_does_not_block_others() {
        let hub = hub(10, 1);
        let slow = hub.attach().await.unwrap();
        let mut fast = hub.attach().await.unwrap();

        // Fills the slow session's queue
        hub.publish(LogEntry::info("a")).await;
        assert_eq!(fast.entries.recv().await.unwrap().message, "a");

        let started = tokio::time::Instant::now();
        hub.publish(LogEntry::info("b")).await;
        assert!(started.elapsed() <= Duration::from_secs(1) + Duration::from_millis(10));

        assert!(slow.cancel.is_cancelled());
        assert!(!hub.is_attached(slow.id));
        assert_eq!(fast.entries.recv().await.unwrap().message, "b");
        assert_eq!(hub.session_count(), 1);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let hub = hub(10, 4);
        let attachment = hub.attach().await.unwrap();
        assert!(hub.detach(attachment.id));
        assert!(!hub.detach(attachment.id));
        assert!(attachment.cancel.is_cancelled());
        assert_eq!(hub.session_count(), 0);

        // Publishing afterwards does not touch the detached session
        assert_eq!(hub.publish(LogEntry::info("x")).await, Some(1));
    }

    #[tokio::test]
    async fn test_shutdown_detaches_everything() {
        let hub = hub(10, 4);
        let a = hub.attach().await.unwrap();
        let b = hub.attach().await.unwrap();

        hub.shutdown();
        assert!(hub.is_shut_down());
        assert!(a.cancel.is_cancelled());
        assert!(b.cancel.is_cancelled());
        assert_eq!(hub.session_count(), 0);
        assert!(matches!(hub.attach().await, Err(SessionError::HubShutDown)));
        assert_eq!(hub.publish(LogEntry::info("late")).await, None);
        hub.closed().await;
    }
}
