use crate::domain::Severity;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Source of uniform values in `[0.0, 1.0)` for sampling decisions.
#[cfg_attr(test, automock)]
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Thread-local RNG; the default source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Deterministic source for reproducible sampling.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&self) -> f64 {
        self.rng.lock().random::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    BelowFloor,
    SampledOut,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

/// Decides whether a record is worth queueing at all.
///
/// Critical records always pass; everything else must clear the severity floor
/// and then survive sampling.
#[derive(Clone)]
pub struct AdmissionGate {
    min_severity: Option<Severity>,
    sampling_rate: f64,
    random: Arc<dyn RandomSource>,
}

impl AdmissionGate {
    pub fn new(min_severity: Option<Severity>, sampling_rate: f64) -> Self {
        Self::with_random(min_severity, sampling_rate, Arc::new(ThreadRandom))
    }

    pub fn with_random(
        min_severity: Option<Severity>,
        sampling_rate: f64,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let sampling_rate = if sampling_rate.is_nan() {
            1.0
        } else {
            sampling_rate.clamp(0.0, 1.0)
        };

        Self {
            min_severity,
            sampling_rate,
            random,
        }
    }

    pub fn min_severity(&self) -> Option<Severity> {
        self.min_severity
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn admit(&self, severity: Severity) -> Admission {
        if severity.is_critical() {
            return Admission::Admitted;
        }

        if let Some(floor) = self.min_severity
            && severity < floor
        {
            return Admission::BelowFloor;
        }

        if self.sampling_rate >= 1.0 {
            return Admission::Admitted;
        }
        if self.sampling_rate <= 0.0 {
            return Admission::SampledOut;
        }

        if self.random.next_unit() < self.sampling_rate {
            Admission::Admitted
        } else {
            Admission::SampledOut
        }
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(None, 1.0)
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("min_severity", &self.min_severity)
            .field("sampling_rate", &self.sampling_rate)
            .finish()
    }
}
