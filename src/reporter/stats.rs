use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for the reporter.
#[derive(Debug, Default)]
pub struct ReporterStats {
    reported: AtomicU64,
    below_floor: AtomicU64,
    sampled_out: AtomicU64,
    flushes_succeeded: AtomicU64,
    flushes_failed: AtomicU64,
    flushes_skipped: AtomicU64,
    records_delivered: AtomicU64,
    records_restored: AtomicU64,
    records_discarded: AtomicU64,
    records_spilled: AtomicU64,
    records_recovered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReporterStatsSnapshot {
    pub reported: u64,
    pub below_floor: u64,
    pub sampled_out: u64,
    pub flushes_succeeded: u64,
    pub flushes_failed: u64,
    pub flushes_skipped: u64,
    pub records_delivered: u64,
    pub records_restored: u64,
    pub records_discarded: u64,
    pub records_spilled: u64,
    pub records_recovered: u64,
}

macro_rules! counters {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $method(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl ReporterStats {
    counters! {
        add_reported => reported,
        add_below_floor => below_floor,
        add_sampled_out => sampled_out,
        add_flush_succeeded => flushes_succeeded,
        add_flush_failed => flushes_failed,
        add_flush_skipped => flushes_skipped,
        add_delivered => records_delivered,
        add_restored => records_restored,
        add_discarded => records_discarded,
        add_spilled => records_spilled,
        add_recovered => records_recovered,
    }

    pub fn snapshot(&self) -> ReporterStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ReporterStatsSnapshot {
            reported: load(&self.reported),
            below_floor: load(&self.below_floor),
            sampled_out: load(&self.sampled_out),
            flushes_succeeded: load(&self.flushes_succeeded),
            flushes_failed: load(&self.flushes_failed),
            flushes_skipped: load(&self.flushes_skipped),
            records_delivered: load(&self.records_delivered),
            records_restored: load(&self.records_restored),
            records_discarded: load(&self.records_discarded),
            records_spilled: load(&self.records_spilled),
            records_recovered: load(&self.records_recovered),
        }
    }
}
