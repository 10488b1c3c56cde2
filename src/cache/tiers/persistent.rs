//! File-backed cache tier
//!
//! One JSON record per normalized key under the tier directory; the directory
//! listing is the index. Writes land in a temp file and are renamed into
//! place so readers never observe a partial record.

use crate::cache::entry::CacheEntry;
use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::{CacheTier, TierKind};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct PersistentTier {
    directory: PathBuf,
}

impl PersistentTier {
    /// Open (creating if needed) the tier directory
    pub async fn open(directory: impl Into<PathBuf>) -> CacheResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await.map_err(|e| {
            CacheError::Io(format!(
                "Failed to create cache directory {}: {e}",
                directory.display()
            ))
        })?;

        debug!(directory = %directory.display(), "Persistent cache tier opened");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    async fn remove_record(&self, path: &Path) -> CacheResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of records currently on disk, expired ones included
    pub async fn record_count(&self) -> CacheResult<usize> {
        Ok(self.record_paths().await?.len())
    }

    async fn record_paths(&self) -> CacheResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut listing = fs::read_dir(&self.directory).await?;
        while let Some(dir_entry) = listing.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Read a record, removing it if it is expired or unreadable
    async fn read_live_record(&self, path: &Path) -> CacheResult<Option<CacheEntry>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding corrupt cache record");
                self.remove_record(path).await?;
                return Ok(None);
            }
        };

        if entry.is_expired_at(Utc::now()) {
            self.remove_record(path).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }
}

#[async_trait]
impl CacheTier for PersistentTier {
    fn kind(&self) -> TierKind {
        TierKind::Persistent
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let path = self.record_path(key);
        let entry = self.read_live_record(&path).await?;
        if entry.is_none() {
            debug!(key = key, "Persistent tier miss");
        }
        Ok(entry)
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        let bytes = serde_json::to_vec(&entry)?;
        let final_path = self.record_path(key);
        let temp_path = self
            .directory
            .join(format!(".{key}.{}.tmp", Uuid::new_v4().simple()));

        fs::write(&temp_path, &bytes).await?;
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.remove_record(&self.record_path(key)).await
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let mut purged = 0;
        for path in self.record_paths().await? {
            let existed = fs::try_exists(&path).await.unwrap_or(false);
            if existed && self.read_live_record(&path).await?.is_none() {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "Persistent tier purged expired records");
        }
        Ok(purged)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(fs::metadata(&self.directory)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false))
    }
}
