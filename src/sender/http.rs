use super::{ErrorSink, SinkError};
use crate::domain::ErrorRecord;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use reqwest::{Client, ClientBuilder};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const REST_PREFIX: &str = "rest/v1";
const COMPRESSION_THRESHOLD: usize = 100;

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub endpoint: String,
    pub table: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:54321".to_string(),
            table: "error_reports".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            user_agent: format!("fault-reporter/{}", env!("CARGO_PKG_VERSION")),
            enable_compression: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SinkStats {
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    records_sent: AtomicU64,
    total_response_time_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub records_sent: u64,
    pub average_response_time: Duration,
}

impl SinkStats {
    fn record(&self, success: bool, records: usize, response_time: Duration) {
        self.total_response_time_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);
        if success {
            self.batches_sent.fetch_add(1, Ordering::Relaxed);
            self.records_sent
                .fetch_add(records as u64, Ordering::Relaxed);
        } else {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        let sent = self.batches_sent.load(Ordering::Relaxed);
        let failed = self.batches_failed.load(Ordering::Relaxed);
        let total = sent + failed;
        let total_ms = self.total_response_time_ms.load(Ordering::Relaxed);

        SinkStatsSnapshot {
            batches_sent: sent,
            batches_failed: failed,
            records_sent: self.records_sent.load(Ordering::Relaxed),
            average_response_time: if total > 0 {
                Duration::from_millis(total_ms / total)
            } else {
                Duration::ZERO
            },
        }
    }
}

/// Inserts batches as rows into a REST table endpoint
/// (`POST <endpoint>/rest/v1/<table>` with a JSON array body).
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    config: SinkConfig,
    base_url: Url,
    insert_url: Url,
    stats: Arc<SinkStats>,
}

impl HttpSink {
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        let endpoint_url: Url = config.endpoint.parse().map_err(|e| {
            SinkError::InvalidConfiguration(format!("Invalid endpoint URL: {e}"))
        })?;

        if config.table.is_empty() || config.table.contains('/') {
            return Err(SinkError::InvalidConfiguration(format!(
                "Invalid table name: '{}'",
                config.table
            )));
        }

        let table_suffix = format!("{REST_PREFIX}/{}", config.table);
        let (base_url, insert_url) = if endpoint_url.path().ends_with(&table_suffix) {
            let mut base = endpoint_url.clone();
            let trimmed = base.path().trim_end_matches(config.table.as_str()).to_string();
            base.set_path(&trimmed);
            (base, endpoint_url)
        } else {
            let root = endpoint_url.path().trim_end_matches('/');
            let mut base = endpoint_url.clone();
            base.set_path(&format!("{root}/{REST_PREFIX}/"));
            let mut insert = endpoint_url.clone();
            insert.set_path(&format!("{root}/{table_suffix}"));
            (base, insert)
        };

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| {
                SinkError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            base_url,
            insert_url,
            stats: Arc::new(SinkStats::default()),
        })
    }

    pub fn insert_url(&self) -> &Url {
        &self.insert_url
    }

    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// GETs the REST root; any 2xx counts as healthy.
    pub async fn health_check(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .get(self.base_url.clone())
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::from_status(
                status.as_u16(),
                format!("Health check failed: {status}"),
            ))
        }
    }

    async fn post_batch(&self, batch: &[Arc<ErrorRecord>]) -> Result<(), SinkError> {
        let rows: Vec<&ErrorRecord> = batch.iter().map(Arc::as_ref).collect();
        let body = serde_json::to_vec(&rows)?;

        let use_compression = self.config.enable_compression && batch.len() > COMPRESSION_THRESHOLD;
        let payload = if use_compression {
            gzip(&body).map_err(|e| SinkError::Serialization(format!("Compression failed: {e}")))?
        } else {
            body
        };

        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=minimal"),
        );
        if use_compression {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        let response = self
            .client
            .post(self.insert_url.clone())
            .headers(headers)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(SinkError::from_status(status.as_u16(), message))
    }

    fn auth_headers(&self) -> Result<HeaderMap, SinkError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.config.api_key {
            let invalid = |e: reqwest::header::InvalidHeaderValue| {
                SinkError::InvalidConfiguration(format!("Invalid API key header: {e}"))
            };
            headers.insert(
                HeaderName::from_static("apikey"),
                HeaderValue::from_str(key).map_err(invalid)?,
            );
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
            );
        }
        Ok(headers)
    }
}

impl ErrorSink for HttpSink {
    async fn submit(&self, batch: &[Arc<ErrorRecord>]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let result = self.post_batch(batch).await;
        let elapsed = start.elapsed();
        self.stats.record(result.is_ok(), batch.len(), elapsed);

        match &result {
            Ok(()) => debug!(
                records = batch.len(),
                latency_ms = elapsed.as_millis() as u64,
                "Inserted error batch into {}",
                self.insert_url
            ),
            Err(e) => warn!(records = batch.len(), "Error batch insert failed: {e}"),
        }

        result
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
