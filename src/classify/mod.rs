//! Error classification.
//!
//! Turns whatever was thrown into an [`AppError`] with a kind, source and
//! severity. Classification is a pure transform and never fails.

pub mod patterns;

use crate::domain::{AppError, ErrorKind, ErrorSource, Severity};
use std::error::Error as StdError;

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";
pub const NETWORK_ERROR_MESSAGE: &str = "Network connection error";

/// A captured error value, before classification.
#[derive(Debug, Clone)]
pub enum Captured {
    /// Already classified; passed through untouched.
    Record(AppError),
    /// A typed error, rendered with its source chain.
    Error {
        message: String,
        chain: Option<String>,
    },
    /// A bare message.
    Message(String),
    /// An uncaught panic.
    Panic {
        message: String,
        location: Option<String>,
        backtrace: Option<String>,
    },
    /// A spawned task that resolved to an error nobody handled.
    Rejection {
        reason: String,
        chain: Option<String>,
    },
}

impl Captured {
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        Captured::Error {
            message: error.to_string(),
            chain: render_chain(error.source()),
        }
    }

    pub fn rejection(error: &(dyn StdError + 'static)) -> Self {
        Captured::Rejection {
            reason: error.to_string(),
            chain: render_chain(error.source()),
        }
    }
}

fn render_chain(mut source: Option<&(dyn StdError + 'static)>) -> Option<String> {
    let mut lines = Vec::new();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

impl From<AppError> for Captured {
    fn from(error: AppError) -> Self {
        Captured::Record(error)
    }
}

impl From<&str> for Captured {
    fn from(message: &str) -> Self {
        Captured::Message(message.to_string())
    }
}

impl From<String> for Captured {
    fn from(message: String) -> Self {
        Captured::Message(message)
    }
}

impl From<std::io::Error> for Captured {
    fn from(error: std::io::Error) -> Self {
        Captured::from_error(&error)
    }
}

impl From<Box<dyn StdError + Send + Sync>> for Captured {
    fn from(error: Box<dyn StdError + Send + Sync>) -> Self {
        Captured::from_error(error.as_ref())
    }
}

impl From<anyhow::Error> for Captured {
    fn from(error: anyhow::Error) -> Self {
        let causes: Vec<String> = error
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {cause}"))
            .collect();

        Captured::Error {
            message: error.to_string(),
            chain: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

/// Classifies a captured value.
pub fn classify(captured: impl Into<Captured>) -> AppError {
    match captured.into() {
        Captured::Record(error) => normalize_message(error),
        Captured::Error { message, chain } => {
            let error = by_message(message, None);
            attach_trace(error, chain)
        }
        Captured::Message(message) => by_message(message, None),
        Captured::Panic {
            message,
            location,
            backtrace,
        } => {
            let mut error = by_message(message, Some(ErrorKind::ClientError))
                .with_context("type", "uncaught_panic");
            if let Some(location) = location {
                error = error.with_context("location", location);
            }
            attach_trace(error, backtrace)
        }
        Captured::Rejection { reason, chain } => {
            let error = by_message(reason, Some(ErrorKind::ClientError))
                .with_context("type", "unhandled_rejection");
            attach_trace(error, chain)
        }
    }
}

/// Applies the keyword rules. `fallback` picks the kind used when no rule
/// matches: `ClientError` implies a `Client` source.
fn by_message(message: String, fallback: Option<ErrorKind>) -> AppError {
    let message = non_empty(message);

    if patterns::NETWORK.is_match(&message) {
        return AppError::new(NETWORK_ERROR_MESSAGE)
            .with_kind(ErrorKind::NetworkError)
            .with_source(ErrorSource::Network)
            .with_severity(Severity::Error)
            .with_context("original_message", message);
    }

    if patterns::AUTHENTICATION.is_match(&message) {
        return AppError::new(message)
            .with_kind(ErrorKind::Authentication)
            .with_source(ErrorSource::Auth)
            .with_severity(Severity::Error);
    }

    match fallback {
        Some(ErrorKind::ClientError) => AppError::new(message)
            .with_kind(ErrorKind::ClientError)
            .with_source(ErrorSource::Client),
        _ => AppError::new(message),
    }
}

fn attach_trace(error: AppError, trace: Option<String>) -> AppError {
    match trace {
        Some(trace) if !trace.trim().is_empty() => error.with_stack_trace(trace),
        _ => error,
    }
}

fn normalize_message(mut error: AppError) -> AppError {
    if error.message.trim().is_empty() {
        error.message = UNKNOWN_ERROR_MESSAGE.to_string();
    }
    error
}

fn non_empty(message: String) -> String {
    if message.trim().is_empty() {
        UNKNOWN_ERROR_MESSAGE.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("insert into materials failed")]
    struct InsertFailed {
        #[source]
        cause: std::io::Error,
    }

    #[test]
    fn test_pass_through_is_identity() {
        let original = AppError::new("quota exceeded")
            .with_kind(ErrorKind::Validation)
            .with_source(ErrorSource::Database)
            .with_severity(Severity::Critical)
            .with_code("Q1");

        let classified = classify(original.clone());

        assert_eq!(classified, original);
    }

    #[test]
    fn test_network_error() {
        let classified = classify("TypeError: network request failed");

        assert_eq!(classified.message, NETWORK_ERROR_MESSAGE);
        assert_eq!(classified.kind, ErrorKind::NetworkError);
        assert_eq!(classified.source, ErrorSource::Network);
        assert_eq!(classified.severity, Severity::Error);
        assert_eq!(
            classified.context.unwrap()["original_message"],
            "TypeError: network request failed"
        );
    }

    #[test]
    fn test_authentication_error() {
        let classified = classify("refresh token is invalid".to_string());

        assert_eq!(classified.message, "refresh token is invalid");
        assert_eq!(classified.kind, ErrorKind::Authentication);
        assert_eq!(classified.source, ErrorSource::Auth);
        assert_eq!(classified.severity, Severity::Error);
    }

    #[test]
    fn test_generic_error() {
        let classified = classify("cannot read property 'quantity' of undefined");

        assert_eq!(classified.kind, ErrorKind::Unknown);
        assert_eq!(classified.source, ErrorSource::Unknown);
        assert_eq!(classified.severity, Severity::Error);
    }

    #[test]
    fn test_empty_messages_are_replaced() {
        assert_eq!(classify("").message, UNKNOWN_ERROR_MESSAGE);
        assert_eq!(classify("   ").message, UNKNOWN_ERROR_MESSAGE);
        assert_eq!(classify(AppError::new("")).message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_typed_error_keeps_source_chain() {
        let error = InsertFailed {
            cause: std::io::Error::other("disk quota"),
        };

        let classified = classify(Captured::from_error(&error));

        assert_eq!(classified.message, "insert into materials failed");
        assert_eq!(classified.stack_trace.as_deref(), Some("caused by: disk quota"));
    }

    #[test]
    fn test_anyhow_chain() {
        let error = anyhow::anyhow!("pool exhausted").context("loading stock alerts");

        let classified = classify(error);

        assert_eq!(classified.message, "loading stock alerts");
        assert_eq!(
            classified.stack_trace.as_deref(),
            Some("caused by: pool exhausted")
        );
    }

    #[test]
    fn test_panic_defaults_to_client_error() {
        let classified = classify(Captured::Panic {
            message: "index out of bounds".to_string(),
            location: Some("src/inventory.rs:10:5".to_string()),
            backtrace: None,
        });

        assert_eq!(classified.kind, ErrorKind::ClientError);
        assert_eq!(classified.source, ErrorSource::Client);
        let context = classified.context.unwrap();
        assert_eq!(context["type"], "uncaught_panic");
        assert_eq!(context["location"], "src/inventory.rs:10:5");
        assert!(classified.stack_trace.is_none());
    }

    #[test]
    fn test_rejection_still_matches_keywords() {
        let classified = classify(Captured::Rejection {
            reason: "session expired".to_string(),
            chain: None,
        });

        assert_eq!(classified.kind, ErrorKind::Authentication);
        assert_eq!(classified.context.unwrap()["type"], "unhandled_rejection");
    }

    #[test]
    fn test_every_input_yields_nonempty_message() {
        let inputs: Vec<Captured> = vec![
            "".into(),
            "network down".into(),
            "token".into(),
            AppError::new(" ").into(),
            Captured::Panic {
                message: String::new(),
                location: None,
                backtrace: Some("   ".to_string()),
            },
            Captured::Rejection {
                reason: String::new(),
                chain: None,
            },
        ];

        for input in inputs {
            let classified = classify(input);
            assert!(!classified.message.trim().is_empty());
            assert!(classified.stack_trace.is_none());
        }
    }
}
