use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use redirlog_types::LogEntry;

/// Reference capacity of the recent-history buffer
pub const DEFAULT_CAPACITY: usize = 100;

struct Inner {
    entries: VecDeque<Arc<LogEntry>>,
    /// Sequence number of the most recently appended entry (0 = none yet)
    last_seq: u64,
}

/// Thread-safe bounded store of the most recent log entries
#[derive(Clone)]
pub struct EventStore {
    /// Internal storage
    inner: Arc<RwLock<Inner>>,

    /// Maximum capacity
    capacity: usize,
}

impl EventStore {
    /// Create a new store with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                last_seq: 0,
            })),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest if at capacity.
    ///
    /// Returns the sequence number assigned to the entry.
    pub fn append(&self, entry: Arc<LogEntry>) -> u64 {
        let mut inner = self.inner.write();
        if inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
        inner.last_seq += 1;
        inner.last_seq
    }

    /// Point-in-time copy of the contents, oldest first
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.inner.read().entries.iter().cloned().collect()
    }

    /// Get the last N entries
    pub fn tail(&self, n: usize) -> Vec<Arc<LogEntry>> {
        let inner = self.inner.read();
        let start = inner.entries.len().saturating_sub(n);
        inner.entries.iter().skip(start).cloned().collect()
    }

    /// Sequence number of the newest entry, 0 if nothing was appended yet
    pub fn last_seq(&self) -> u64 {
        self.inner.read().last_seq
    }

    /// Total entry count
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.last_seq = 0;
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
