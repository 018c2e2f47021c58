//! The reporter service.
//!
//! `ErrorReporter` ties the pieces together: classification, admission,
//! session stamping, the bounded queue and the flush scheduler. It is an
//! explicitly constructed handle; clones share one queue and one scheduler.

pub mod config;
pub mod flush;
mod scheduler;
pub mod stats;

pub use config::{DEFAULT_FLUSH_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT, ReporterConfig};
pub use flush::{FlushOutcome, FlushState, FlushTrigger};
pub use stats::{ReporterStats, ReporterStatsSnapshot};

use crate::buffer::{Admission, AdmissionGate, EnqueueOutcome, RandomSource, ReportQueue};
use crate::classify::{Captured, classify};
use crate::domain::{ErrorRecord, ReporterError, SessionId, Severity, Stamp};
use crate::reliability::SpillStore;
use crate::sender::ErrorSink;
use flush::FlushControl;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const DISPOSED: u8 = 2;

/// What `report_error` did with a captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Queued,
    /// Queued; the oldest pending record was evicted to make room.
    QueuedWithEviction,
    /// The queue was full and the record was refused.
    Overflowed,
    BelowFloor,
    SampledOut,
    /// Reporting is turned off in the config.
    Disabled,
    /// The reporter has been disposed.
    Closed,
}

impl ReportOutcome {
    pub fn is_queued(self) -> bool {
        matches!(
            self,
            ReportOutcome::Queued | ReportOutcome::QueuedWithEviction
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisposeSummary {
    /// `None` when the final flush did not finish within the shutdown timeout.
    pub final_flush: Option<FlushOutcome>,
    pub timed_out: bool,
    pub spilled: usize,
    pub abandoned: usize,
}

/// Object-safe reporting seam used by the process hooks.
pub trait ErrorReporting: Send + Sync + 'static {
    fn report(&self, captured: Captured) -> ReportOutcome;
}

pub(crate) struct Inner<S> {
    config: ReporterConfig,
    sink: S,
    queue: ReportQueue,
    gate: AdmissionGate,
    stamp: Stamp,
    user_id: RwLock<Option<String>>,
    critical: Notify,
    cancel: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    lifecycle: AtomicU8,
    flush: FlushControl,
    spill: tokio::sync::Mutex<Option<SpillStore>>,
    stats: ReporterStats,
}

pub struct ErrorReporter<S: ErrorSink> {
    inner: Arc<Inner<S>>,
}

impl<S: ErrorSink> Clone for ErrorReporter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ErrorSink> ErrorReporter<S> {
    pub fn new(config: ReporterConfig, sink: S) -> Result<Self, ReporterError> {
        let gate = AdmissionGate::new(config.min_severity, config.sampling_rate);
        Self::build(config, sink, gate)
    }

    /// Same as [`ErrorReporter::new`] with an explicit sampling source.
    pub fn with_random(
        config: ReporterConfig,
        sink: S,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, ReporterError> {
        let gate = AdmissionGate::with_random(config.min_severity, config.sampling_rate, random);
        Self::build(config, sink, gate)
    }

    fn build(config: ReporterConfig, sink: S, gate: AdmissionGate) -> Result<Self, ReporterError> {
        config.validate()?;

        let queue = ReportQueue::new(config.queue_capacity, config.overflow_policy)
            .map_err(|e| ReporterError::Config(e.to_string()))?;

        let stamp = Stamp {
            session_id: SessionId::generate(),
            user_id: None,
            host: hostname::get().ok().and_then(|h| h.into_string().ok()),
            user_agent: Some(config.user_agent.clone()),
            include_context: config.include_context,
            include_stack_trace: config.include_stack_trace,
        };

        debug!(session_id = %stamp.session_id, "Error reporter created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sink,
                queue,
                gate,
                stamp,
                user_id: RwLock::new(None),
                critical: Notify::new(),
                cancel: CancellationToken::new(),
                scheduler: Mutex::new(None),
                lifecycle: AtomicU8::new(CREATED),
                flush: FlushControl::default(),
                spill: tokio::sync::Mutex::new(None),
                stats: ReporterStats::default(),
            }),
        })
    }

    /// Reloads spilled records and starts the flush scheduler.
    pub async fn start(&self) -> Result<(), ReporterError> {
        match self.inner.lifecycle.compare_exchange(
            CREATED,
            RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(RUNNING) => return Err(ReporterError::AlreadyStarted),
            Err(_) => return Err(ReporterError::Disposed),
        }

        if let Err(e) = self.recover_spilled().await {
            self.inner.lifecycle.store(CREATED, Ordering::Release);
            return Err(e);
        }

        let handle = scheduler::spawn(Arc::clone(&self.inner));
        *self.inner.scheduler.lock() = Some(handle);

        info!(session_id = %self.inner.stamp.session_id, "Error reporter started");
        Ok(())
    }

    async fn recover_spilled(&self) -> Result<(), ReporterError> {
        let Some(spill_config) = &self.inner.config.spill else {
            return Ok(());
        };

        let mut store = SpillStore::new(spill_config.clone()).await?;
        store.cleanup_expired().await?;

        let recovered: Vec<Arc<ErrorRecord>> =
            store.take_all().await?.into_iter().map(Arc::new).collect();
        if !recovered.is_empty() {
            let count = recovered.len();
            let dropped = self.inner.queue.restore_front(recovered);
            self.inner.stats.add_recovered((count - dropped) as u64);
            info!(count, dropped, "Recovered spilled error records");
        }

        *self.inner.spill.lock().await = Some(store);
        Ok(())
    }

    /// Classifies, filters, stamps and enqueues. Never fails and never blocks
    /// on I/O, so it is safe to call from a panic hook.
    pub fn report_error(&self, captured: impl Into<Captured>) -> ReportOutcome {
        let inner = &self.inner;

        if !inner.config.enabled {
            return ReportOutcome::Disabled;
        }
        if inner.lifecycle.load(Ordering::Acquire) == DISPOSED {
            return ReportOutcome::Closed;
        }

        let classified = classify(captured);

        match inner.gate.admit(classified.severity) {
            Admission::Admitted => {}
            Admission::BelowFloor => {
                inner.stats.add_below_floor(1);
                return ReportOutcome::BelowFloor;
            }
            Admission::SampledOut => {
                inner.stats.add_sampled_out(1);
                return ReportOutcome::SampledOut;
            }
        }

        let stamp = Stamp {
            user_id: inner.user_id.read().clone(),
            ..inner.stamp.clone()
        };
        let record = Arc::new(ErrorRecord::stamp(classified, &stamp));

        if inner.config.log_to_console {
            log_record(&record);
        }

        let critical = record.is_critical();
        let outcome = match inner.queue.enqueue(record) {
            EnqueueOutcome::Accepted => ReportOutcome::Queued,
            EnqueueOutcome::Evicted => ReportOutcome::QueuedWithEviction,
            EnqueueOutcome::Rejected => return ReportOutcome::Overflowed,
            // dispose() closed the queue after the lifecycle check above
            EnqueueOutcome::Closed => return ReportOutcome::Closed,
        };
        inner.stats.add_reported(1);

        if critical {
            inner.critical.notify_one();
        }

        outcome
    }

    /// Sets the user id stamped on records reported from now on.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.inner.user_id.write() = user_id;
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.user_id.read().clone()
    }

    /// Runs one flush cycle now, unless one is already in flight.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush_cycle(FlushTrigger::Manual).await
    }

    /// Stops the scheduler, makes one final flush bounded by the shutdown
    /// timeout, then spills or drops whatever is left.
    pub async fn dispose(&self) -> Result<DisposeSummary, ReporterError> {
        let previous = self.inner.lifecycle.swap(DISPOSED, Ordering::AcqRel);
        if previous == DISPOSED {
            return Err(ReporterError::Disposed);
        }

        self.inner.cancel.cancel();

        let mut scheduler = self.inner.scheduler.lock().take();
        let mut scheduler_joined = scheduler.is_none();
        let shutdown_timeout = self.inner.config.shutdown_timeout;

        let final_flush = timeout(shutdown_timeout, async {
            if let Some(handle) = scheduler.as_mut() {
                if let Err(e) = handle.await {
                    warn!("Flush scheduler ended abnormally: {e}");
                }
                scheduler_joined = true;
            }
            self.inner.flush_cycle(FlushTrigger::Shutdown).await
        })
        .await
        .ok();

        let timed_out = final_flush.is_none();
        if timed_out {
            warn!(
                timeout_ms = shutdown_timeout.as_millis() as u64,
                "Final flush did not finish before the shutdown timeout"
            );
        }

        if !scheduler_joined && let Some(handle) = scheduler {
            handle.abort();
            // Wait for the abort so an unsettled snapshot is back in the queue.
            let _ = handle.await;
        }

        let remaining = self.inner.queue.close_and_drain();
        let (spilled, abandoned) = self.spill_remaining(remaining).await;

        let summary = DisposeSummary {
            final_flush,
            timed_out,
            spilled,
            abandoned,
        };
        info!(?summary, "Error reporter disposed");
        Ok(summary)
    }

    async fn spill_remaining(&self, remaining: Vec<Arc<ErrorRecord>>) -> (usize, usize) {
        if remaining.is_empty() {
            return (0, 0);
        }
        let count = remaining.len();

        let Some(spill_config) = &self.inner.config.spill else {
            warn!(count, "Dropping undelivered error records at shutdown");
            return (0, count);
        };

        let mut store = self.inner.spill.lock().await;
        if store.is_none() {
            match SpillStore::new(spill_config.clone()).await {
                Ok(opened) => *store = Some(opened),
                Err(e) => {
                    error!(count, "Failed to open spill store, dropping records: {e}");
                    return (0, count);
                }
            }
        }

        let Some(store) = store.as_mut() else {
            return (0, count);
        };

        match store.store(&remaining).await {
            Ok(id) => {
                self.inner.stats.add_spilled(count as u64);
                info!(count, spill_id = %id, "Spilled undelivered error records");
                (count, 0)
            }
            Err(e) => {
                error!(count, "Failed to spill error records, dropping them: {e}");
                (0, count)
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn queue(&self) -> &ReportQueue {
        &self.inner.queue
    }

    /// Number of records in the submission currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.flush.submitting_len()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.flush.is_in_flight()
    }

    pub fn flush_state(&self) -> FlushState {
        self.inner.flush.state()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.stamp.session_id
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.inner.config
    }

    pub fn sink(&self) -> &S {
        &self.inner.sink
    }

    pub fn stats(&self) -> ReporterStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.load(Ordering::Acquire) == RUNNING
    }
}

impl<S: ErrorSink> ErrorReporting for ErrorReporter<S> {
    fn report(&self, captured: Captured) -> ReportOutcome {
        self.report_error(captured)
    }
}

impl<S: ErrorSink> std::fmt::Debug for ErrorReporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("session_id", &self.inner.stamp.session_id)
            .field("pending", &self.inner.queue.len())
            .field("flush_state", &self.inner.flush.state())
            .field("lifecycle", &self.inner.lifecycle.load(Ordering::Relaxed))
            .finish()
    }
}

fn log_record(record: &ErrorRecord) {
    let kind = record.kind().as_str();
    let source = record.source().as_str();
    match record.severity() {
        Severity::Info => info!(kind, source, "{}", record.message()),
        Severity::Warning => warn!(kind, source, "{}", record.message()),
        severity @ (Severity::Error | Severity::Critical) => error!(
            kind,
            source,
            severity = severity.as_str(),
            "{}",
            record.message()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppError, ErrorKind};
    use crate::sender::SinkError;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
    }

    impl ErrorSink for CountingSink {
        async fn submit(&self, _batch: &[Arc<ErrorRecord>]) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn quiet_config() -> ReporterConfig {
        ReporterConfig {
            log_to_console: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_report_stamps_session_and_user() {
        let reporter = ErrorReporter::new(quiet_config(), CountingSink::default()).unwrap();
        reporter.set_user_id(Some("user-42".to_string()));

        assert_eq!(reporter.report_error("boom"), ReportOutcome::Queued);

        let drained = reporter.queue().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].session_id(), reporter.session_id());
        assert_eq!(drained[0].user_id(), Some("user-42"));
    }

    #[test]
    fn test_disabled_reporter_is_noop() {
        let config = ReporterConfig {
            enabled: false,
            ..quiet_config()
        };
        let reporter = ErrorReporter::new(config, CountingSink::default()).unwrap();

        assert_eq!(reporter.report_error("ignored"), ReportOutcome::Disabled);
        assert_eq!(reporter.pending(), 0);
    }

    #[test]
    fn test_context_dropped_when_excluded() {
        let config = ReporterConfig {
            include_context: false,
            ..quiet_config()
        };
        let reporter = ErrorReporter::new(config, CountingSink::default()).unwrap();

        reporter.report_error(
            AppError::new("bad input")
                .with_kind(ErrorKind::Validation)
                .with_context("field", "email"),
        );

        let drained = reporter.queue().drain();
        assert!(drained[0].context().is_none());
        assert_eq!(drained[0].kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ReporterConfig {
            sampling_rate: -0.5,
            ..quiet_config()
        };
        assert!(matches!(
            ErrorReporter::new(config, CountingSink::default()),
            Err(ReporterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let reporter = ErrorReporter::new(quiet_config(), CountingSink::default()).unwrap();
        reporter.start().await.unwrap();

        assert!(matches!(reporter.start().await, Err(ReporterError::AlreadyStarted)));

        reporter.dispose().await.unwrap();
        assert!(matches!(reporter.dispose().await, Err(ReporterError::Disposed)));
        assert_eq!(reporter.report_error("late"), ReportOutcome::Closed);
    }

    #[tokio::test]
    async fn test_manual_flush_skips_empty_queue() {
        let reporter = ErrorReporter::new(quiet_config(), CountingSink::default()).unwrap();

        assert_eq!(reporter.flush().await, FlushOutcome::Empty);
        assert_eq!(reporter.sink().calls.load(Ordering::SeqCst), 0);

        reporter.report_error("one");
        assert_eq!(reporter.flush().await, FlushOutcome::Delivered { records: 1 });
        assert_eq!(reporter.flush_state(), FlushState::Idle);
    }
}
