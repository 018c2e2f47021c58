use crate::buffer::{DEFAULT_QUEUE_CAPACITY, OverflowPolicy};
use crate::domain::{ReporterError, Severity};
use crate::reliability::SpillConfig;
use std::time::Duration;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// When false, `report_error` is a no-op.
    pub enabled: bool,
    /// Emit every accepted record as a tracing event.
    pub log_to_console: bool,
    /// When false, records are queued but never flushed.
    pub report_to_sink: bool,
    pub include_context: bool,
    pub include_stack_trace: bool,
    /// Fraction of non-critical records kept, in `[0.0, 1.0]`.
    pub sampling_rate: f64,
    /// Records below this are dropped; critical always passes.
    pub min_severity: Option<Severity>,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on the final flush during `dispose`.
    pub shutdown_timeout: Duration,
    /// Discard a batch the sink permanently rejects instead of restoring it.
    pub drop_rejected_batches: bool,
    pub spill: Option<SpillConfig>,
    pub user_agent: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_to_console: true,
            report_to_sink: true,
            include_context: true,
            include_stack_trace: true,
            sampling_rate: 1.0,
            min_severity: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            drop_rejected_batches: false,
            spill: None,
            user_agent: format!("fault-reporter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<(), ReporterError> {
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(ReporterError::Config(format!(
                "Sampling rate must be between 0.0 and 1.0, got {}",
                self.sampling_rate
            )));
        }

        if self.flush_interval.is_zero() {
            return Err(ReporterError::Config(
                "Flush interval must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ReporterError::Config(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ReporterError::Config(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
