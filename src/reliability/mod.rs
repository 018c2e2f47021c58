pub mod spill;

pub use spill::{SpillConfig, SpillError, SpillStore};
