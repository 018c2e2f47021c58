#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Millisecond durations fit in u64
    clippy::cast_precision_loss,      // Acceptable for sampling and stats
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. ReporterConfig in reporter module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod classify;
pub mod domain;
pub mod hooks;
pub mod reliability;
pub mod reporter;
pub mod sender;

// Re-export main types for easy access
pub use classify::{Captured, classify};
pub use domain::{AppError, ErrorKind, ErrorRecord, ErrorSource, ReporterError, Severity};
pub use hooks::{HookError, HookGuard};
pub use reporter::{ErrorReporter, ErrorReporting, FlushOutcome, ReportOutcome, ReporterConfig};
pub use sender::{ErrorSink, HttpSink, SinkConfig, SinkError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
