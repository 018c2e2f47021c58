use fault_reporter::app::{Config, ConfigError, LogFormat, LogLevel};
use fault_reporter::buffer::OverflowPolicy;
use fault_reporter::domain::Severity;
use serial_test::serial;
use std::{env, time::Duration};
use tempfile::TempDir;

// Clears every variable the config reads, before and after each test
fn clean_all_env_vars() {
    let env_vars = [
        "FAULT_CONFIG",
        "FAULT_ENDPOINT",
        "FAULT_TABLE",
        "FAULT_API_KEY",
        "FAULT_USER_ID",
        "FAULT_FLUSH_INTERVAL_MS",
        "FAULT_QUEUE_CAPACITY",
        "FAULT_OVERFLOW_POLICY",
        "FAULT_SAMPLING_RATE",
        "FAULT_MIN_SEVERITY",
        "FAULT_SHUTDOWN_TIMEOUT_MS",
        "FAULT_REQUEST_TIMEOUT_SECS",
        "FAULT_CONNECTION_TIMEOUT_SECS",
        "FAULT_ENABLE_COMPRESSION",
        "FAULT_DROP_REJECTED",
        "FAULT_ECHO_REPORTS",
        "FAULT_ENABLE_SPILL",
        "FAULT_SPILL_PATH",
        "FAULT_MAX_SPILL_MB",
        "FAULT_LOG_LEVEL",
        "FAULT_LOG_FORMAT",
        "FAULT_CONFIG_FILE",
    ];

    unsafe {
        for var in &env_vars {
            env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn test_config_from_args() {
    clean_all_env_vars();

    let config = Config::from_args([
        "fault-reporter",
        "--endpoint",
        "https://project.example.co",
        "--table",
        "client_errors",
        "--flush-interval-ms",
        "5000",
        "--overflow-policy",
        "drop-newest",
        "--min-severity",
        "warning",
        "--sampling-rate",
        "0.25",
        "--log-level",
        "debug",
        "--echo-reports",
        "false",
    ])
    .unwrap();

    assert_eq!(config.endpoint, "https://project.example.co");
    assert_eq!(config.table, "client_errors");
    assert_eq!(config.flush_interval, Duration::from_secs(5));
    assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
    assert_eq!(config.min_severity, Some(Severity::Warning));
    assert_eq!(config.sampling_rate, 0.25);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(!config.echo_reports);

    let reporter_config = config.to_reporter_config();
    assert!(!reporter_config.log_to_console);
    assert_eq!(reporter_config.flush_interval, Duration::from_secs(5));
}

#[test]
#[serial]
fn test_config_from_env() {
    clean_all_env_vars();

    unsafe {
        env::set_var("FAULT_ENDPOINT", "http://db.internal:3000");
        env::set_var("FAULT_API_KEY", "secret");
        env::set_var("FAULT_QUEUE_CAPACITY", "250");
        env::set_var("FAULT_OVERFLOW_POLICY", "DROP-NEWEST");
        env::set_var("FAULT_MIN_SEVERITY", "error");
        env::set_var("FAULT_LOG_FORMAT", "json");
        env::set_var("FAULT_DROP_REJECTED", "true");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.endpoint, "http://db.internal:3000");
    assert_eq!(config.api_key.as_deref(), Some("secret"));
    assert_eq!(config.queue_capacity, 250);
    assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
    assert_eq!(config.min_severity, Some(Severity::Error));
    assert_eq!(config.log_format, LogFormat::Json);
    assert!(config.drop_rejected_batches);

    let sink_config = config.to_sink_config();
    assert_eq!(sink_config.api_key.as_deref(), Some("secret"));

    clean_all_env_vars();
}

#[test]
#[serial]
fn test_invalid_env_value_is_reported() {
    clean_all_env_vars();

    unsafe {
        env::set_var("FAULT_MIN_SEVERITY", "catastrophic");
    }
    assert!(matches!(Config::from_env(), Err(ConfigError::EnvError(_))));

    clean_all_env_vars();
    unsafe {
        env::set_var("FAULT_QUEUE_CAPACITY", "lots");
    }
    assert!(matches!(Config::from_env(), Err(ConfigError::EnvError(_))));

    clean_all_env_vars();
}

#[test]
#[serial]
fn test_inline_config_fills_unset_args() {
    clean_all_env_vars();

    unsafe {
        env::set_var(
            "FAULT_CONFIG",
            r#"
endpoint = "https://inline.example.co"
table = "inline_errors"
queue_capacity = 50
"#,
        );
    }

    let config = Config::from_args_and_env(["fault-reporter", "--table", "cli_errors"]).unwrap();
    assert_eq!(config.endpoint, "https://inline.example.co");
    assert_eq!(config.table, "cli_errors");
    assert_eq!(config.queue_capacity, 50);

    clean_all_env_vars();
}

#[test]
#[serial]
fn test_inline_config_survives_args_and_env() {
    clean_all_env_vars();

    unsafe {
        env::set_var(
            "FAULT_CONFIG",
            r#"
sampling_rate = 0.0
overflow_policy = "drop_newest"
shutdown_timeout_ms = 250
drop_rejected_batches = true
echo_reports = false
log_format = "json"
"#,
        );
    }

    let from_env = Config::from_env().unwrap();
    let config = Config::from_args_and_env(["fault-reporter"]).unwrap();

    for config in [&from_env, &config] {
        assert_eq!(config.sampling_rate, 0.0);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
        assert!(config.drop_rejected_batches);
        assert!(!config.echo_reports);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    // Explicit arguments and their variables still win
    unsafe {
        env::set_var("FAULT_SHUTDOWN_TIMEOUT_MS", "900");
    }
    let config = Config::from_args_and_env(["fault-reporter", "--sampling-rate", "0.5"]).unwrap();
    assert_eq!(config.sampling_rate, 0.5);
    assert_eq!(config.shutdown_timeout, Duration::from_millis(900));
    assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);

    clean_all_env_vars();
}

#[test]
#[serial]
fn test_config_from_file() {
    clean_all_env_vars();

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fault-reporter.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
endpoint = "https://file.example.co"
flush_interval_ms = 1000
shutdown_timeout_ms = 500
enable_spill = true
spill_path = "{}"
min_severity = "warning"
overflow_policy = "drop_newest"
"#,
            temp_dir.path().join("spill").display()
        ),
    )
    .unwrap();

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config.endpoint, "https://file.example.co");
    assert_eq!(config.flush_interval, Duration::from_secs(1));
    assert_eq!(config.shutdown_timeout, Duration::from_millis(500));
    assert_eq!(config.min_severity, Some(Severity::Warning));
    assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
    assert_eq!(config.table, "error_reports");

    let spill = config.to_reporter_config().spill.unwrap();
    assert_eq!(spill.storage_path, temp_dir.path().join("spill"));
}

#[test]
#[serial]
fn test_invalid_endpoint_is_rejected() {
    clean_all_env_vars();

    let result = Config::from_args(["fault-reporter", "--endpoint", "not a url"]);
    assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
}
