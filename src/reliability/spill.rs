use crate::domain::ErrorRecord;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

const SPILL_EXTENSION: &str = "spill";

#[derive(Error, Debug)]
pub enum SpillError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Spill file not found: {0}")]
    NotFound(String),
    #[error("Disk space exceeded")]
    DiskSpaceExceeded,
    #[error("System time error: {0}")]
    SystemTimeError(String),
}

#[derive(Debug, Clone)]
pub struct SpillConfig {
    pub storage_path: PathBuf,
    pub max_disk_usage: u64, // bytes
    pub retention_period: Duration,
    pub compression: bool,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("/tmp/fault-reporter/spill"),
            max_disk_usage: 64 * 1024 * 1024,                  // 64MB
            retention_period: Duration::from_secs(7 * 24 * 3600), // 7 days
            compression: true,
        }
    }
}

#[derive(Serialize)]
struct SpillFileRef<'a> {
    id: &'a str,
    stored_at_ms: u64,
    records: Vec<&'a ErrorRecord>,
}

#[derive(Deserialize)]
struct SpillFile {
    id: String,
    stored_at_ms: u64,
    records: Vec<ErrorRecord>,
}

/// Local on-disk holding area for records that could not be delivered
/// before shutdown. Each spill is one gzip-compressed JSON file.
#[derive(Debug)]
pub struct SpillStore {
    config: SpillConfig,
    current_usage: u64,
}

impl SpillStore {
    pub async fn new(config: SpillConfig) -> Result<Self, SpillError> {
        fs::create_dir_all(&config.storage_path).await?;
        let current_usage = Self::calculate_disk_usage(&config.storage_path).await?;

        Ok(Self {
            config,
            current_usage,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.storage_path
    }

    /// Writes `records` to a new spill file and returns its id.
    pub async fn store(&mut self, records: &[Arc<ErrorRecord>]) -> Result<String, SpillError> {
        let id = Uuid::new_v4().to_string();
        let stored_at_ms = unix_now_millis()?;

        let file = SpillFileRef {
            id: &id,
            stored_at_ms,
            records: records.iter().map(Arc::as_ref).collect(),
        };
        let serialized = serde_json::to_vec(&file)?;

        let data = if self.config.compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(&serialized)?;
            encoder.finish()?
        } else {
            serialized
        };

        if self.current_usage + data.len() as u64 > self.config.max_disk_usage {
            return Err(SpillError::DiskSpaceExceeded);
        }

        let file_path = self.file_path(&id);
        let mut handle = fs::File::create(&file_path).await?;
        handle.write_all(&data).await?;
        handle.sync_all().await?;

        self.current_usage += data.len() as u64;

        tracing::debug!(
            "Spilled {} records to {} ({} bytes)",
            records.len(),
            file_path.display(),
            data.len()
        );
        Ok(id)
    }

    pub async fn list(&self) -> Result<Vec<String>, SpillError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.config.storage_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(SPILL_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                ids.push(stem.to_string());
            }
        }

        Ok(ids)
    }

    pub async fn load(&self, id: &str) -> Result<Vec<ErrorRecord>, SpillError> {
        Ok(self.read_file(id).await?.records)
    }

    /// Removes every spill file and returns the records, oldest spill first.
    ///
    /// Files that cannot be decoded are left in place and skipped.
    pub async fn take_all(&mut self) -> Result<Vec<ErrorRecord>, SpillError> {
        let mut files = Vec::new();
        for id in self.list().await? {
            match self.read_file(&id).await {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!("Skipping unreadable spill file {id}: {e}"),
            }
        }
        files.sort_by_key(|file| file.stored_at_ms);

        let mut records = Vec::new();
        for file in files {
            self.delete(&file.id).await?;
            records.extend(file.records);
        }

        Ok(records)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), SpillError> {
        let file_path = self.file_path(id);
        if !file_path.exists() {
            return Err(SpillError::NotFound(id.to_string()));
        }

        let file_size = fs::metadata(&file_path).await?.len();
        fs::remove_file(&file_path).await?;
        self.current_usage = self.current_usage.saturating_sub(file_size);

        tracing::debug!("Deleted spill file {id}");
        Ok(())
    }

    pub async fn cleanup_expired(&mut self) -> Result<u32, SpillError> {
        let now = unix_now_millis()?;
        let mut deleted_count = 0;

        for id in self.list().await? {
            if let Ok(file) = self.read_file(&id).await
                && now.saturating_sub(file.stored_at_ms) > self.config.retention_period.as_millis() as u64
                && self.delete(&id).await.is_ok()
            {
                deleted_count += 1;
            }
        }

        if deleted_count > 0 {
            tracing::info!("Cleaned up {deleted_count} expired spill files");
        }

        Ok(deleted_count)
    }

    pub fn current_disk_usage(&self) -> u64 {
        self.current_usage
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.config
            .storage_path
            .join(format!("{id}.{SPILL_EXTENSION}"))
    }

    async fn read_file(&self, id: &str) -> Result<SpillFile, SpillError> {
        let file_path = self.file_path(id);
        if !file_path.exists() {
            return Err(SpillError::NotFound(id.to_string()));
        }

        let mut handle = fs::File::open(&file_path).await?;
        let mut data = Vec::new();
        handle.read_to_end(&mut data).await?;

        // Accept both compressed and plain files
        let decoded = match decompress(&data) {
            Ok(decompressed) => decompressed,
            Err(_) => data,
        };

        Ok(serde_json::from_slice(&decoded)?)
    }

    async fn calculate_disk_usage(path: &Path) -> Result<u64, SpillError> {
        let mut total_size = 0u64;
        let mut entries = fs::read_dir(path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                total_size += entry.metadata().await?.len();
            }
        }

        Ok(total_size)
    }
}

fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

fn unix_now_millis() -> Result<u64, SpillError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .map_err(|e| SpillError::SystemTimeError(format!("Invalid system time: {e}")))
}
