use crate::domain::ErrorRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

// Upper bound to prevent excessive memory allocation
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Invalid queue capacity: {capacity}")]
    InvalidCapacity { capacity: usize },
}

/// What to discard when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room.
    #[default]
    DropOldest,
    /// Refuse the incoming record. Critical records still get in by evicting
    /// the oldest entry.
    DropNewest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Accepted after evicting the oldest entry.
    Evicted,
    Rejected,
    /// The queue was closed by `close_and_drain`.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    pub capacity: usize,
    pub len: usize,
    pub enqueued: u64,
    pub drained: u64,
    pub restored: u64,
    pub dropped: u64,
    pub peak_len: usize,
}

/// Ordered buffer of records waiting to be flushed.
///
/// `drain` hands out everything queued at that instant; records enqueued
/// afterwards wait for the next cycle. A failed flush goes back in front via
/// `restore_front`, keeping the original order ahead of newer records.
pub struct ReportQueue {
    entries: Mutex<VecDeque<Arc<ErrorRecord>>>,
    capacity: usize,
    policy: OverflowPolicy,
    // Only written and read with `entries` locked.
    closed: AtomicBool,
    enqueued: AtomicU64,
    drained: AtomicU64,
    restored: AtomicU64,
    dropped: AtomicU64,
    peak_len: AtomicUsize,
}

impl ReportQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, QueueError> {
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(QueueError::InvalidCapacity { capacity });
        }

        Ok(Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            restored: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            peak_len: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn enqueue(&self, record: Arc<ErrorRecord>) -> EnqueueOutcome {
        let mut entries = self.entries.lock();
        if self.closed.load(Ordering::Relaxed) {
            return EnqueueOutcome::Closed;
        }

        let outcome = if entries.len() < self.capacity {
            EnqueueOutcome::Accepted
        } else {
            match self.policy {
                OverflowPolicy::DropNewest if !record.is_critical() => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return EnqueueOutcome::Rejected;
                }
                _ => {
                    entries.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    EnqueueOutcome::Evicted
                }
            }
        };

        entries.push_back(record);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.update_peak(entries.len());
        outcome
    }

    /// Removes and returns every queued record, oldest first.
    pub fn drain(&self) -> Vec<Arc<ErrorRecord>> {
        let snapshot: Vec<_> = std::mem::take(&mut *self.entries.lock()).into();
        self.drained
            .fetch_add(snapshot.len() as u64, Ordering::Relaxed);
        snapshot
    }

    /// Refuses every later `enqueue` and returns what is still queued.
    ///
    /// Closing and draining happen under one lock, so a record is either in
    /// the returned snapshot or refused with [`EnqueueOutcome::Closed`].
    pub fn close_and_drain(&self) -> Vec<Arc<ErrorRecord>> {
        let mut entries = self.entries.lock();
        self.closed.store(true, Ordering::Relaxed);
        let snapshot: Vec<_> = std::mem::take(&mut *entries).into();
        self.drained
            .fetch_add(snapshot.len() as u64, Ordering::Relaxed);
        snapshot
    }

    /// Puts a drained snapshot back ahead of anything enqueued since.
    ///
    /// Returns how many records were discarded to stay within capacity.
    pub fn restore_front(&self, snapshot: Vec<Arc<ErrorRecord>>) -> usize {
        if snapshot.is_empty() {
            return 0;
        }

        let mut entries = self.entries.lock();
        let restored = snapshot.len() as u64;
        for record in snapshot.into_iter().rev() {
            entries.push_front(record);
        }

        let overflow = entries.len().saturating_sub(self.capacity);
        if overflow > 0 {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    entries.drain(..overflow);
                }
                OverflowPolicy::DropNewest => {
                    let keep = entries.len() - overflow;
                    entries.truncate(keep);
                }
            }
            self.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
        }

        self.restored.fetch_add(restored, Ordering::Relaxed);
        self.update_peak(entries.len());
        overflow
    }

    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            capacity: self.capacity,
            len: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            restored: self.restored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            peak_len: self.peak_len.load(Ordering::Relaxed),
        }
    }

    fn update_peak(&self, len: usize) {
        self.peak_len.fetch_max(len, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ReportQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}
