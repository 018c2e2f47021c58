use super::Inner;
use super::flush::{FlushOutcome, FlushTrigger};
use crate::sender::ErrorSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

/// Spawns the flush loop: one cycle per interval tick and one per critical
/// record, until the reporter's cancellation token fires.
pub(crate) fn spawn<S: ErrorSink>(inner: Arc<Inner<S>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = inner.config.flush_interval;
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "Flush scheduler started");

        loop {
            let trigger = tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => break,
                _ = inner.critical.notified() => FlushTrigger::Critical,
                _ = interval.tick() => FlushTrigger::Timer,
            };

            match inner.flush_cycle(trigger).await {
                FlushOutcome::Empty | FlushOutcome::Disabled => {}
                outcome => debug!(?trigger, ?outcome, "Scheduled flush finished"),
            }
        }

        info!("Flush scheduler stopped");
    })
}
