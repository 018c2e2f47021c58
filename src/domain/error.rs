use thiserror::Error;

/// Top-level error type for the reporter.
#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reporter already started")]
    AlreadyStarted,

    #[error("Reporter has been disposed")]
    Disposed,

    #[error("Sink error: {0}")]
    Sink(#[from] crate::sender::SinkError),

    #[error("Spill error: {0}")]
    Spill(#[from] crate::reliability::SpillError),

    #[error("Hook error: {0}")]
    Hook(#[from] crate::hooks::HookError),
}
