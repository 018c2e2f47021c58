//! Domain layer for fault-reporter.
//!
//! Contains the canonical types shared across all modules:
//! - `Severity`, `ErrorSource`, `ErrorKind`: the error taxonomy
//! - `AppError`: a classified error, before session stamping
//! - `ErrorRecord`: the immutable row delivered to the sink
//! - `ReporterError`: Top-level error type

pub mod app_error;
pub mod error;
pub mod record;
pub mod taxonomy;

pub use app_error::{AppError, Context};
pub use error::ReporterError;
pub use record::{ErrorRecord, SessionId, Stamp};
pub use taxonomy::{ErrorKind, ErrorSource, Severity};
