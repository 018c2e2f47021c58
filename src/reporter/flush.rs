use super::Inner;
use crate::buffer::ReportQueue;
use crate::domain::ErrorRecord;
use crate::sender::{ErrorSink, SinkError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a flush cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Draining,
    Submitting,
}

impl FlushState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => FlushState::Draining,
            2 => FlushState::Submitting,
            _ => FlushState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            FlushState::Idle => 0,
            FlushState::Draining => 1,
            FlushState::Submitting => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Timer,
    Critical,
    Manual,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// Another flush was already in flight.
    Skipped,
    /// Sink delivery is turned off.
    Disabled,
    Delivered { records: usize },
    /// The sink failed; the snapshot is back at the front of the queue.
    Restored { records: usize, error: SinkError },
    /// The sink permanently rejected the snapshot and it was dropped.
    Discarded { records: usize, error: SinkError },
}

impl FlushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FlushOutcome::Delivered { .. })
    }
}

/// In-flight guard plus the snapshot currently being submitted.
#[derive(Debug, Default)]
pub(crate) struct FlushControl {
    in_flight: AtomicBool,
    state: AtomicU8,
    submitting: Mutex<Vec<Arc<ErrorRecord>>>,
}

impl FlushControl {
    pub(crate) fn state(&self) -> FlushState {
        FlushState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn submitting_len(&self) -> usize {
        self.submitting.lock().len()
    }

    fn try_acquire<'a>(&'a self, queue: &'a ReportQueue) -> Option<InFlightGuard<'a>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                control: self,
                queue,
            })
    }

    fn set_state(&self, state: FlushState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Releases the in-flight flag when the cycle ends.
///
/// If the flush future is dropped while a submission is unsettled (shutdown
/// timeout, task abort), the snapshot goes back to the front of the queue.
struct InFlightGuard<'a> {
    control: &'a FlushControl,
    queue: &'a ReportQueue,
}

impl InFlightGuard<'_> {
    fn begin_submit(&self, snapshot: &[Arc<ErrorRecord>]) {
        *self.control.submitting.lock() = snapshot.to_vec();
        self.control.set_state(FlushState::Submitting);
    }

    fn settle(&self) {
        self.control.submitting.lock().clear();
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let unsettled = std::mem::take(&mut *self.control.submitting.lock());
        if !unsettled.is_empty() {
            let records = unsettled.len();
            let dropped = self.queue.restore_front(unsettled);
            debug!(records, dropped, "Flush abandoned mid-submit, snapshot restored");
        }
        self.control.set_state(FlushState::Idle);
        self.control.in_flight.store(false, Ordering::Release);
    }
}

impl<S: ErrorSink> Inner<S> {
    /// One `Idle -> Draining -> Submitting -> Idle` cycle.
    pub(crate) async fn flush_cycle(&self, trigger: FlushTrigger) -> FlushOutcome {
        if !self.config.report_to_sink {
            return FlushOutcome::Disabled;
        }

        let Some(guard) = self.flush.try_acquire(&self.queue) else {
            debug!(?trigger, "Flush already in flight, skipping");
            self.stats.add_flush_skipped(1);
            return FlushOutcome::Skipped;
        };

        self.flush.set_state(FlushState::Draining);
        let snapshot = self.queue.drain();
        if snapshot.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch_id = Uuid::new_v4();
        let records = snapshot.len();
        guard.begin_submit(&snapshot);
        debug!(%batch_id, ?trigger, records, "Submitting error batch");

        let start = Instant::now();
        let result = self.sink.submit(&snapshot).await;
        guard.settle();

        match result {
            Ok(()) => {
                self.stats.add_flush_succeeded(1);
                self.stats.add_delivered(records as u64);
                info!(
                    %batch_id,
                    ?trigger,
                    records,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Delivered error batch"
                );
                FlushOutcome::Delivered { records }
            }
            Err(error) if self.config.drop_rejected_batches && !error.is_retryable() => {
                self.stats.add_flush_failed(1);
                self.stats.add_discarded(records as u64);
                warn!(%batch_id, records, "Sink rejected error batch, discarding: {error}");
                FlushOutcome::Discarded { records, error }
            }
            Err(error) => {
                self.stats.add_flush_failed(1);
                let dropped = self.queue.restore_front(snapshot);
                self.stats.add_restored((records - dropped) as u64);
                warn!(
                    %batch_id,
                    records,
                    dropped,
                    "Error batch delivery failed, restored to queue: {error}"
                );
                FlushOutcome::Restored { records, error }
            }
        }
    }
}
