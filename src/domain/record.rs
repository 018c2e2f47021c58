use super::app_error::{AppError, Context, write_summary};
use super::taxonomy::{ErrorKind, ErrorSource, Severity};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const SESSION_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier assigned once per reporter lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// `<unix millis>-<7 base36 chars>`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..SESSION_SUFFIX_LEN)
            .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("{}-{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-level attributes stamped onto every record.
#[derive(Debug, Clone)]
pub struct Stamp {
    pub session_id: SessionId,
    pub user_id: Option<String>,
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub include_context: bool,
    pub include_stack_trace: bool,
}

/// The row delivered to the remote sink.
///
/// Fields are private: a record is never altered after creation, and a failed
/// flush restores the same `Arc<ErrorRecord>` values it drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(rename = "type")]
    kind: ErrorKind,
    source: ErrorSource,
    severity: Severity,
    timestamp: DateTime<Utc>,
    session_id: SessionId,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
    #[serde(default)]
    resolved: bool,
}

impl ErrorRecord {
    pub fn stamp(error: AppError, stamp: &Stamp) -> Self {
        Self {
            message: error.message,
            code: error.code,
            kind: error.kind,
            source: error.source,
            severity: error.severity,
            timestamp: error.timestamp,
            session_id: stamp.session_id.clone(),
            user_id: stamp.user_id.clone(),
            host: stamp.host.clone(),
            user_agent: stamp.user_agent.clone(),
            context: error.context.filter(|_| stamp.include_context),
            stack_trace: error.stack_trace.filter(|_| stamp.include_stack_trace),
            resolved: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn source(&self) -> ErrorSource {
        self.source
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn is_critical(&self) -> bool {
        self.severity.is_critical()
    }
}

impl fmt::Display for ErrorRecord {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn full_stamp() -> Stamp {
        Stamp {
            session_id: SessionId::from("1700000000000-abc1234"),
            user_id: Some("user-42".to_string()),
            host: Some("site-office".to_string()),
            user_agent: Some("fault-reporter/0.1.0".to_string()),
            include_context: true,
            include_stack_trace: true,
        }
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), SESSION_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_stamp_copies_classification() {
        let error = AppError::new("insert failed")
            .with_kind(ErrorKind::ServerError)
            .with_source(ErrorSource::Database)
            .with_context("table", "materials")
            .with_stack_trace("at insert");
        let timestamp = error.timestamp;

        let record = ErrorRecord::stamp(error, &full_stamp());

        assert_eq!(record.message(), "insert failed");
        assert_eq!(record.kind(), ErrorKind::ServerError);
        assert_eq!(record.timestamp(), timestamp);
        assert_eq!(record.user_id(), Some("user-42"));
        assert_eq!(record.session_id().as_str(), "1700000000000-abc1234");
        assert!(record.context().is_some());
        assert_eq!(record.stack_trace(), Some("at insert"));
    }

    #[test]
    fn test_stamp_strips_optional_attachments() {
        let stamp = Stamp {
            include_context: false,
            include_stack_trace: false,
            ..full_stamp()
        };
        let error = AppError::new("x")
            .with_context("k", "v")
            .with_stack_trace("trace");

        let record = ErrorRecord::stamp(error, &stamp);

        assert!(record.context().is_none());
        assert!(record.stack_trace().is_none());
    }

    #[test]
    fn test_row_shape() {
        let record = ErrorRecord::stamp(AppError::new("x"), &full_stamp());
        let row = serde_json::to_value(&record).unwrap();

        assert_eq!(row["type"], "unknown");
        assert_eq!(row["session_id"], "1700000000000-abc1234");
        assert_eq!(row["resolved"], false);
        assert!(row.get("code").is_none());
    }

    #[test]
    fn test_display_matches_classified_error() {
        let error = AppError::new("upload failed")
            .with_kind(ErrorKind::ServerError)
            .with_severity(Severity::Critical)
            .with_code("PGRST301");
        let record = ErrorRecord::stamp(error.clone(), &full_stamp());

        assert_eq!(record.to_string(), error.to_string());
        assert!(record.to_string().ends_with("upload failed (PGRST301)"));
    }
}
