use super::taxonomy::{ErrorKind, ErrorSource, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form key/value attachment carried with an error.
pub type Context = BTreeMap<String, serde_json::Value>;

/// A classified error, not yet stamped with session or user.
///
/// The timestamp is taken when the value is built and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppError {
    pub message: String,
    pub code: Option<String>,
    pub kind: ErrorKind,
    pub source: ErrorSource,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub context: Option<Context>,
    pub stack_trace: Option<String>,
}

impl AppError {
    /// Builds an error with `unknown` kind and source at `error` severity.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: ErrorKind::Unknown,
            source: ErrorSource::Unknown,
            severity: Severity::Error,
            timestamp: Utc::now(),
            context: None,
            stack_trace: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Adds one context entry, creating the map on first use.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context
            .get_or_insert_with(Context::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn is_validation(&self) -> bool {
        self.is_kind(ErrorKind::Validation)
    }

    pub fn is_authentication(&self) -> bool {
        self.is_kind(ErrorKind::Authentication)
    }

    pub fn is_authorization(&self) -> bool {
        self.is_kind(ErrorKind::Authorization)
    }

    pub fn is_not_found(&self) -> bool {
        self.is_kind(ErrorKind::NotFound)
    }

    pub fn is_timeout(&self) -> bool {
        self.is_kind(ErrorKind::Timeout)
    }

    pub fn is_server_error(&self) -> bool {
        self.is_kind(ErrorKind::ServerError)
    }

    pub fn is_client_error(&self) -> bool {
        self.is_kind(ErrorKind::ClientError)
    }

    pub fn is_network_error(&self) -> bool {
        self.is_kind(ErrorKind::NetworkError)
    }
}

/// `[severity] [source] [kind] message (code)`, shared with `ErrorRecord`.
pub(crate) fn write_summary(
    f: &mut fmt::Formatter<'_>,
    severity: Severity,
    source: ErrorSource,
    kind: ErrorKind,
    message: &str,
    code: Option<&str>,
) -> fmt::Result {
    write!(f, "[{severity}] [{source}] [{kind}] {message}")?;
    if let Some(code) = code {
        write!(f, " ({code})")?;
    }
    Ok(())
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_summary(
            f,
            self.severity,
            self.source,
            self.kind,
            &self.message,
            self.code.as_deref(),
        )
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let error = AppError::new("boom");
        assert_eq!(error.kind, ErrorKind::Unknown);
        assert_eq!(error.source, ErrorSource::Unknown);
        assert_eq!(error.severity, Severity::Error);
        assert!(error.context.is_none());
    }

    #[test]
    fn test_display_includes_code() {
        let error = AppError::new("row rejected")
            .with_code("PGRST204")
            .with_kind(ErrorKind::Validation)
            .with_source(ErrorSource::Database)
            .with_severity(Severity::Warning);

        assert_eq!(
            error.to_string(),
            "[warning] [database] [validation] row rejected (PGRST204)"
        );
        assert!(error.is_validation());
        assert!(!error.is_timeout());
    }

    #[test]
    fn test_context_accumulates() {
        let error = AppError::new("render failed")
            .with_context("component", "MaterialsTable")
            .with_context("row", 12);

        let context = error.context.unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context["component"], "MaterialsTable");
        assert_eq!(context["row"], 12);
    }
}
