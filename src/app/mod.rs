//! Relay binary: reads error lines from stdin and reports them.
//!
//! Each line is either plain text or a JSON object with a `message` and
//! optional `severity`, `kind`, `source`, `code` and `context` fields.

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging::{LoggingError, setup_logging};
pub use shutdown::{ShutdownSignal, wait_for_signal};

use crate::classify::{Captured, classify};
use crate::domain::{AppError, Context, ErrorKind, ErrorSource, Severity};
use crate::hooks;
use crate::reporter::{DisposeSummary, ErrorReporter};
use crate::sender::{ErrorSink, HttpSink};
use serde::Deserialize;
use std::process;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One structured input line.
#[derive(Debug, Deserialize)]
struct RelayLine {
    message: String,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default, rename = "type")]
    kind: Option<ErrorKind>,
    #[serde(default)]
    source: Option<ErrorSource>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    context: Option<Context>,
}

/// Turns an input line into something the reporter accepts. Lines without an
/// explicit kind or source go through the keyword rules first.
pub fn parse_line(line: &str) -> Captured {
    let trimmed = line.trim();
    let Some(parsed) = trimmed
        .starts_with('{')
        .then(|| serde_json::from_str::<RelayLine>(trimmed).ok())
        .flatten()
    else {
        return Captured::Message(trimmed.to_string());
    };

    let mut error = match (parsed.kind, parsed.source) {
        (None, None) => classify(parsed.message),
        (kind, source) => AppError::new(parsed.message)
            .with_kind(kind.unwrap_or(ErrorKind::Unknown))
            .with_source(source.unwrap_or(ErrorSource::Unknown)),
    };

    if let Some(severity) = parsed.severity {
        error.severity = severity;
    }
    if let Some(code) = parsed.code {
        error.code = Some(code);
    }
    if let Some(context) = parsed.context {
        error.context.get_or_insert_with(Context::new).extend(context);
    }

    Captured::Record(error)
}

pub struct App<S: ErrorSink = HttpSink> {
    config: Config,
    reporter: ErrorReporter<S>,
}

impl App<HttpSink> {
    pub async fn from_args<I, T>(args: I) -> Result<Self, BoxError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args_and_env(args)?;
        let config = match &config.config_file {
            Some(config_file) => {
                eprintln!("Loading configuration from file: {}", config_file.display());
                Config::from_file(config_file)?
            }
            None => config,
        };

        if let Err(e) = setup_logging(config.log_level, config.log_format) {
            eprintln!("Warning: {e}");
        }

        let sink = HttpSink::new(config.to_sink_config())?;
        Self::with_sink(config, sink)
    }
}

impl<S: ErrorSink> App<S> {
    pub fn with_sink(config: Config, sink: S) -> Result<Self, BoxError> {
        let reporter = ErrorReporter::new(config.to_reporter_config(), sink)?;
        reporter.set_user_id(config.user_id.clone());
        Ok(Self { config, reporter })
    }

    pub fn reporter(&self) -> &ErrorReporter<S> {
        &self.reporter
    }

    /// Reports every line of `input` until EOF or `shutdown` fires, then
    /// disposes the reporter.
    pub async fn run<R>(
        self,
        input: R,
        shutdown: CancellationToken,
    ) -> Result<DisposeSummary, BoxError>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("Starting fault-reporter v{}", crate::VERSION);
        info!(
            "Configuration: endpoint={}, table={}, flush_interval={:?}, queue_capacity={}",
            self.config.endpoint,
            self.config.table,
            self.config.flush_interval,
            self.config.queue_capacity
        );

        self.reporter.start().await?;
        let hook_guard = match hooks::install(self.reporter.clone()) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Panic reporting disabled: {e}");
                None
            }
        };

        let mut lines = input.lines();
        let mut relayed = 0u64;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        self.reporter.report_error(parse_line(&line));
                        relayed += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {e}");
                        break;
                    }
                },
            }
        }

        info!(relayed, "Input closed, shutting down");
        drop(hook_guard);

        let summary = self.reporter.dispose().await?;
        info!(
            "fault-reporter stopped (spilled={}, abandoned={})",
            summary.spilled, summary.abandoned
        );
        Ok(summary)
    }
}

pub async fn main() -> Result<(), BoxError> {
    let app = match App::<HttpSink>::from_args(std::env::args()).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    let shutdown_token = CancellationToken::new();
    shutdown::spawn_signal_listener(shutdown_token.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = app.run(stdin, shutdown_token).await {
        error!("Application error: {}", e);
        process::exit(1);
    }

    Ok(())
}
