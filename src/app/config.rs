use crate::buffer::{DEFAULT_QUEUE_CAPACITY, OverflowPolicy};
use crate::domain::Severity;
use crate::reliability::SpillConfig;
use crate::reporter::ReporterConfig;
use crate::sender::SinkConfig;
use clap::parser::ValueSource;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_ENDPOINT: &str = "http://localhost:54321";
const DEFAULT_TABLE: &str = "error_reports";
const DEFAULT_SPILL_PATH: &str = "/tmp/fault-reporter/spill";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST endpoint that stores error reports
    #[arg(long, env = "FAULT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Table the reports are inserted into
    #[arg(long, env = "FAULT_TABLE", default_value = DEFAULT_TABLE)]
    pub table: String,

    /// API key sent as `apikey` and bearer token
    #[arg(long, env = "FAULT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// User id stamped on every report
    #[arg(long, env = "FAULT_USER_ID")]
    pub user_id: Option<String>,

    /// Flush interval in milliseconds
    #[arg(long, env = "FAULT_FLUSH_INTERVAL_MS", default_value = "30000")]
    pub flush_interval_ms: u64,

    /// Maximum number of pending reports
    #[arg(long, env = "FAULT_QUEUE_CAPACITY", default_value = "1000")]
    pub queue_capacity: usize,

    /// What to discard when the queue is full
    #[arg(long, env = "FAULT_OVERFLOW_POLICY", default_value = "drop-oldest")]
    pub overflow_policy: OverflowPolicy,

    /// Fraction of non-critical reports kept (0.0 - 1.0)
    #[arg(long, env = "FAULT_SAMPLING_RATE", default_value = "1.0")]
    pub sampling_rate: f64,

    /// Drop reports below this severity (critical always passes)
    #[arg(long, env = "FAULT_MIN_SEVERITY")]
    pub min_severity: Option<Severity>,

    /// Upper bound on the final flush at shutdown, in milliseconds
    #[arg(long, env = "FAULT_SHUTDOWN_TIMEOUT_MS", default_value = "4000")]
    pub shutdown_timeout_ms: u64,

    /// Request timeout in seconds
    #[arg(long, env = "FAULT_REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds
    #[arg(long, env = "FAULT_CONNECTION_TIMEOUT_SECS", default_value = "5")]
    pub connection_timeout_secs: u64,

    /// Gzip large batches
    #[arg(long, env = "FAULT_ENABLE_COMPRESSION")]
    pub enable_compression: bool,

    /// Discard batches the endpoint permanently rejects instead of retrying them
    #[arg(long, env = "FAULT_DROP_REJECTED")]
    pub drop_rejected_batches: bool,

    /// Log every accepted report locally
    #[arg(long, env = "FAULT_ECHO_REPORTS", default_value_t = true, action = ArgAction::Set)]
    pub echo_reports: bool,

    /// Write undelivered reports to disk at shutdown and reload them on start
    #[arg(long, env = "FAULT_ENABLE_SPILL")]
    pub enable_spill: bool,

    /// Spill directory
    #[arg(long, env = "FAULT_SPILL_PATH", default_value = DEFAULT_SPILL_PATH)]
    pub spill_path: PathBuf,

    /// Maximum disk usage for spill files in MB
    #[arg(long, env = "FAULT_MAX_SPILL_MB", default_value = "64")]
    pub max_spill_mb: u64,

    /// Log level
    #[arg(long, env = "FAULT_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "FAULT_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Configuration file path (optional)
    #[arg(long, env = "FAULT_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub flush_interval: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub shutdown_timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub request_timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub connection_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            table: DEFAULT_TABLE.to_string(),
            api_key: None,
            user_id: None,
            flush_interval_ms: 30_000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
            sampling_rate: 1.0,
            min_severity: None,
            shutdown_timeout_ms: 4_000,
            request_timeout_secs: 10,
            connection_timeout_secs: 5,
            enable_compression: false,
            drop_rejected_batches: false,
            echo_reports: true,
            enable_spill: false,
            spill_path: PathBuf::from(DEFAULT_SPILL_PATH),
            max_spill_mb: 64,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
            flush_interval: Duration::from_millis(30_000),
            shutdown_timeout: Duration::from_millis(4_000),
            request_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        // An inline TOML document wins over individual variables
        if let Ok(inline) = std::env::var("FAULT_CONFIG") {
            return Self::from_toml_str(&inline);
        }

        let mut config = Config::default();

        load_env_string("FAULT_ENDPOINT", &mut config.endpoint);
        load_env_string("FAULT_TABLE", &mut config.table);
        load_env_string_opt("FAULT_API_KEY", &mut config.api_key);
        load_env_string_opt("FAULT_USER_ID", &mut config.user_id);
        load_env_var("FAULT_FLUSH_INTERVAL_MS", &mut config.flush_interval_ms)?;
        load_env_var("FAULT_QUEUE_CAPACITY", &mut config.queue_capacity)?;

        if let Ok(policy) = std::env::var("FAULT_OVERFLOW_POLICY") {
            config.overflow_policy = OverflowPolicy::from_str(&policy, true).map_err(|_| {
                ConfigError::EnvError(format!(
                    "Invalid FAULT_OVERFLOW_POLICY: {policy}. Valid values: drop-oldest, drop-newest"
                ))
            })?;
        }

        load_env_var("FAULT_SAMPLING_RATE", &mut config.sampling_rate)?;
        if let Ok(severity) = std::env::var("FAULT_MIN_SEVERITY") {
            config.min_severity = Some(
                severity
                    .parse()
                    .map_err(|e| ConfigError::EnvError(format!("Invalid FAULT_MIN_SEVERITY: {e}")))?,
            );
        }

        load_env_var("FAULT_SHUTDOWN_TIMEOUT_MS", &mut config.shutdown_timeout_ms)?;
        load_env_var("FAULT_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        load_env_var("FAULT_CONNECTION_TIMEOUT_SECS", &mut config.connection_timeout_secs)?;
        load_env_var("FAULT_ENABLE_COMPRESSION", &mut config.enable_compression)?;
        load_env_var("FAULT_DROP_REJECTED", &mut config.drop_rejected_batches)?;
        load_env_var("FAULT_ECHO_REPORTS", &mut config.echo_reports)?;
        load_env_var("FAULT_ENABLE_SPILL", &mut config.enable_spill)?;
        load_env_path("FAULT_SPILL_PATH", &mut config.spill_path);
        load_env_var("FAULT_MAX_SPILL_MB", &mut config.max_spill_mb)?;

        if let Ok(log_level) = std::env::var("FAULT_LOG_LEVEL") {
            config.log_level = LogLevel::from_str(&log_level, true).map_err(|_| {
                ConfigError::EnvError(format!("Invalid FAULT_LOG_LEVEL: {log_level}"))
            })?;
        }
        if let Ok(log_format) = std::env::var("FAULT_LOG_FORMAT") {
            config.log_format = LogFormat::from_str(&log_format, true).map_err(|_| {
                ConfigError::EnvError(format!(
                    "Invalid FAULT_LOG_FORMAT: {log_format}. Valid values: compact, json"
                ))
            })?;
        }
        load_env_path_opt("FAULT_CONFIG_FILE", &mut config.config_file);

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// CLI arguments layered over [`Config::from_env`].
    ///
    /// Only values clap took from the command line or from their own
    /// variable replace the base; its defaults never do.
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Self::from_env()?;

        let matches = Config::command()
            .try_get_matches_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        let cli = Config::from_arg_matches(&matches)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let explicit = |id: &str| {
            matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(
                    if explicit(stringify!($field)) {
                        config.$field = cli.$field;
                    }
                )+
            };
        }

        overlay!(
            endpoint,
            table,
            api_key,
            user_id,
            flush_interval_ms,
            queue_capacity,
            overflow_policy,
            sampling_rate,
            min_severity,
            shutdown_timeout_ms,
            request_timeout_secs,
            connection_timeout_secs,
            enable_compression,
            drop_rejected_batches,
            echo_reports,
            enable_spill,
            spill_path,
            max_spill_mb,
            log_level,
            log_format,
            config_file,
        );

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.flush_interval = Duration::from_millis(self.flush_interval_ms);
        self.shutdown_timeout = Duration::from_millis(self.shutdown_timeout_ms);
        self.request_timeout = Duration::from_secs(self.request_timeout_secs);
        self.connection_timeout = Duration::from_secs(self.connection_timeout_secs);
        self.endpoint = self.endpoint.trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;

        if self.table.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Table name must not be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(ConfigError::InvalidConfig(format!(
                "Sampling rate must be between 0.0 and 1.0, got {}",
                self.sampling_rate
            )));
        }

        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Flush interval must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 || self.connection_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.enable_spill
            && let Some(parent) = self.spill_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Spill parent directory does not exist: {}",
                parent.display()
            )));
        }

        Ok(())
    }

    pub fn to_reporter_config(&self) -> ReporterConfig {
        let spill = self.enable_spill.then(|| SpillConfig {
            storage_path: self.spill_path.clone(),
            max_disk_usage: self.max_spill_mb * 1024 * 1024,
            ..SpillConfig::default()
        });

        ReporterConfig {
            log_to_console: self.echo_reports,
            sampling_rate: self.sampling_rate,
            min_severity: self.min_severity,
            flush_interval: self.flush_interval,
            queue_capacity: self.queue_capacity,
            overflow_policy: self.overflow_policy,
            shutdown_timeout: self.shutdown_timeout,
            drop_rejected_batches: self.drop_rejected_batches,
            spill,
            ..ReporterConfig::default()
        }
    }

    pub fn to_sink_config(&self) -> SinkConfig {
        SinkConfig {
            endpoint: self.endpoint.clone(),
            table: self.table.clone(),
            api_key: self.api_key.clone(),
            timeout: self.request_timeout,
            connection_timeout: self.connection_timeout,
            enable_compression: self.enable_compression,
            ..SinkConfig::default()
        }
    }
}

/// Loads and parses an environment variable.
/// Returns Ok(()) if the variable doesn't exist (keeps default).
fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        *target = value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

fn load_env_string_opt(name: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(value);
    }
}

fn load_env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}

fn load_env_path(name: &str, target: &mut PathBuf) {
    if let Ok(value) = std::env::var(name) {
        *target = PathBuf::from(value);
    }
}

fn load_env_path_opt(name: &str, target: &mut Option<PathBuf>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(PathBuf::from(value));
    }
}
