pub mod gate;
pub mod queue;

pub use gate::{Admission, AdmissionGate, RandomSource, SeededRandom, ThreadRandom};
pub use queue::{
    DEFAULT_QUEUE_CAPACITY, EnqueueOutcome, OverflowPolicy, QueueError, QueueMetrics, ReportQueue,
};
