use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request timeout")]
    Timeout,
    #[error("Sink unavailable: HTTP {status} - {message}")]
    Unavailable { status: u16, message: String },
    #[error("Batch rejected: HTTP {status} - {message}")]
    Rejected { status: u16, message: String },
}

impl SinkError {
    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 => SinkError::Unavailable { status, message },
            400..=499 => SinkError::Rejected { status, message },
            _ => SinkError::Unavailable { status, message },
        }
    }

    /// False only when the sink refused the data itself; resending the same
    /// batch would fail the same way.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SinkError::Rejected { .. } | SinkError::Serialization(_)
        )
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SinkError::Timeout
        } else {
            SinkError::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(error: serde_json::Error) -> Self {
        SinkError::Serialization(error.to_string())
    }
}
