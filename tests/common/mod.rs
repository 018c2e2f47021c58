#![allow(dead_code)]

use fault_reporter::domain::{AppError, ErrorRecord, SessionId, Severity, Stamp};
use fault_reporter::reporter::ReporterConfig;
use fault_reporter::sender::{ErrorSink, SinkError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Records every submitted batch; pops scripted results first, then succeeds.
#[derive(Default)]
pub struct ScriptedSink {
    script: Mutex<VecDeque<Result<(), SinkError>>>,
    attempts: Mutex<Vec<Vec<Arc<ErrorRecord>>>>,
    entered: Notify,
    gate: Option<Semaphore>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(results: impl IntoIterator<Item = Result<(), SinkError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every submit waits for a permit from `release`.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Resolves once a submit call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn attempts(&self) -> Vec<Vec<Arc<ErrorRecord>>> {
        self.attempts.lock().clone()
    }

    pub fn messages(&self, attempt: usize) -> Vec<String> {
        self.attempts.lock()[attempt]
            .iter()
            .map(|record| record.message().to_string())
            .collect()
    }
}

impl ErrorSink for ScriptedSink {
    async fn submit(&self, batch: &[Arc<ErrorRecord>]) -> Result<(), SinkError> {
        self.attempts.lock().push(batch.to_vec());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| SinkError::Transport(e.to_string()))?;
            permit.forget();
        }

        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(()))
    }
}

/// A sink that never answers.
#[derive(Default)]
pub struct HangingSink;

impl ErrorSink for HangingSink {
    async fn submit(&self, _batch: &[Arc<ErrorRecord>]) -> Result<(), SinkError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub fn quiet_config() -> ReporterConfig {
    ReporterConfig {
        log_to_console: false,
        ..ReporterConfig::default()
    }
}

pub fn error_at(message: &str, severity: Severity) -> AppError {
    AppError::new(message).with_severity(severity)
}

pub fn record(message: &str, severity: Severity) -> Arc<ErrorRecord> {
    let stamp = Stamp {
        session_id: SessionId::from("1700000000000-abc1234"),
        user_id: Some("user-1".to_string()),
        host: None,
        user_agent: None,
        include_context: true,
        include_stack_trace: true,
    };
    Arc::new(ErrorRecord::stamp(error_at(message, severity), &stamp))
}

/// Polls `condition` on a short sleep until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while waited < limit {
        if condition() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    condition()
}
