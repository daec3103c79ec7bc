//! Bounded retry cache with optional disk persistence
//!
//! One JSON file per undelivered batch, named `<batch_id>.json`. Writes go
//! through a temp file and a rename so a crash never leaves a torn entry.
//! Every mutation happens under a single async mutex, which serializes the
//! dispatcher and the retry loop.

use crate::observability::{set_gauge, GaugeMetric, PipelineCounter, PipelineStats};
use crate::record::EncodedBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Retry cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry encoding error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A single entry is larger than the whole cache
    #[error("entry of {size} bytes exceeds cache limit of {limit} bytes")]
    EntryTooLarge { size: usize, limit: usize },
    /// `max_entries` is zero
    #[error("retry cache is configured to hold no entries")]
    NoCapacity,
}

/// A batch awaiting redelivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCacheEntry {
    pub batch_id: Uuid,
    /// Serialized batch body, sent as-is on retry
    pub payload: String,
    pub record_count: usize,
    /// Send attempts made so far
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RetryCacheEntry {
    /// Entry for a batch whose first send just failed
    pub fn first_failure(batch: EncodedBatch, next_retry_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch.batch_id,
            payload: batch.payload,
            record_count: batch.record_count,
            attempts: 1,
            next_retry_at,
            created_at: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }

    pub fn to_encoded(&self) -> EncodedBatch {
        EncodedBatch {
            batch_id: self.batch_id,
            record_count: self.record_count,
            payload: self.payload.clone(),
        }
    }
}

/// Size bounds of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Oldest first
    entries: VecDeque<RetryCacheEntry>,
    total_bytes: usize,
}

/// Durable store of undelivered batches
pub struct RetryCache {
    dir: Option<PathBuf>,
    limits: CacheLimits,
    state: Mutex<CacheState>,
    stats: Arc<PipelineStats>,
}

impl RetryCache {
    /// Open (or create) a persistent cache, reloading entries left by a
    /// previous process. Unreadable files are removed.
    pub async fn open(
        dir: impl Into<PathBuf>,
        limits: CacheLimits,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut loaded = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(ENTRY_EXTENSION) => match read_entry(&path).await {
                    Ok(entry) => loaded.push(entry),
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Removing unreadable cache entry");
                        remove_file_quiet(&path).await;
                    }
                },
                Some(TEMP_EXTENSION) => remove_file_quiet(&path).await,
                _ => {}
            }
        }

        loaded.sort_by_key(|e| e.created_at);

        let cache = Self {
            dir: Some(dir),
            limits,
            state: Mutex::new(CacheState::default()),
            stats,
        };

        {
            let mut state = cache.state.lock().await;
            for entry in loaded {
                state.total_bytes += entry.size();
                state.entries.push_back(entry);
            }
            let evicted = cache.evict_until_fits(&mut state, 0).await;
            if evicted > 0 {
                tracing::warn!(evicted, "Evicted reloaded cache entries over the size limit");
            }
            if !state.entries.is_empty() {
                tracing::info!(
                    entries = state.entries.len(),
                    bytes = state.total_bytes,
                    "Resuming undelivered telemetry from retry cache"
                );
            }
            publish_gauges(&state);
        }

        Ok(cache)
    }

    /// Memory-only cache with the same bounds; nothing survives a restart
    pub fn in_memory(limits: CacheLimits, stats: Arc<PipelineStats>) -> Self {
        Self {
            dir: None,
            limits,
            state: Mutex::new(CacheState::default()),
            stats,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Store an entry, evicting the oldest ones if the cache is full.
    ///
    /// The entry is written before anything is evicted, so a failed write
    /// leaves the cache as it was. Returns how many entries were evicted.
    pub async fn store(&self, entry: RetryCacheEntry) -> Result<usize, CacheError> {
        if self.limits.max_entries == 0 {
            return Err(CacheError::NoCapacity);
        }
        let size = entry.size();
        if size > self.limits.max_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                limit: self.limits.max_bytes,
            });
        }

        let mut state = self.state.lock().await;
        self.persist(&entry).await?;

        // Replacing an existing entry with the same id keeps the count honest
        if let Some(pos) = state.entries.iter().position(|e| e.batch_id == entry.batch_id) {
            if let Some(old) = state.entries.remove(pos) {
                state.total_bytes -= old.size();
            }
        }

        let evicted = self.evict_until_fits(&mut state, size).await;
        if evicted > 0 {
            tracing::warn!(
                evicted,
                max_entries = self.limits.max_entries,
                max_bytes = self.limits.max_bytes,
                "Retry cache full, evicted oldest batches"
            );
        }

        state.total_bytes += size;
        state.entries.push_back(entry);
        publish_gauges(&state);

        Ok(evicted)
    }

    /// Entries whose retry time has passed, oldest first
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<RetryCacheEntry> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect()
    }

    /// Update attempt count and retry time. Returns false if the entry is gone
    /// (evicted while its retry was in flight).
    pub async fn reschedule(
        &self,
        batch_id: Uuid,
        attempts: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.iter_mut().find(|e| e.batch_id == batch_id) else {
            return Ok(false);
        };

        entry.attempts = attempts;
        entry.next_retry_at = next_retry_at;
        let updated = entry.clone();
        self.persist(&updated).await?;

        Ok(true)
    }

    /// Delete an entry after delivery or when giving up on it
    pub async fn remove(&self, batch_id: Uuid) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.entries.iter().position(|e| e.batch_id == batch_id) else {
            return Ok(false);
        };

        if let Some(entry) = state.entries.remove(pos) {
            state.total_bytes -= entry.size();
        }
        publish_gauges(&state);
        drop(state);

        self.unlink(batch_id).await?;
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    pub async fn total_bytes(&self) -> usize {
        self.state.lock().await.total_bytes
    }

    /// Snapshot of all entries, oldest first
    pub async fn entries(&self) -> Vec<RetryCacheEntry> {
        self.state.lock().await.entries.iter().cloned().collect()
    }

    /// Evict oldest entries until `incoming` more bytes and one more entry fit.
    /// With `incoming == 0` only the current contents are checked.
    async fn evict_until_fits(&self, state: &mut CacheState, incoming: usize) -> usize {
        let extra_entry = usize::from(incoming > 0);
        let mut evicted = 0;
        let mut records = 0;

        while !state.entries.is_empty()
            && (state.entries.len() + extra_entry > self.limits.max_entries
                || state.total_bytes + incoming > self.limits.max_bytes)
        {
            let Some(oldest) = state.entries.pop_front() else {
                break;
            };
            state.total_bytes -= oldest.size();
            if let Err(e) = self.unlink(oldest.batch_id).await {
                tracing::warn!(batch_id = %oldest.batch_id, error = %e, "Failed to delete evicted entry");
            }
            tracing::debug!(
                batch_id = %oldest.batch_id,
                records = oldest.record_count,
                "Evicted cached batch"
            );
            evicted += 1;
            records += oldest.record_count;
        }

        self.stats.incr(PipelineCounter::CacheEvictions, evicted as u64);
        self.stats.incr(PipelineCounter::RecordsDropped, records as u64);
        evicted
    }

    async fn persist(&self, entry: &RetryCacheEntry) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let path = entry_path(dir, entry.batch_id);
        let tmp = path.with_extension(TEMP_EXTENSION);
        let bytes = serde_json::to_vec(entry)?;

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn unlink(&self, batch_id: Uuid) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        match tokio::fs::remove_file(entry_path(dir, batch_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn entry_path(dir: &Path, batch_id: Uuid) -> PathBuf {
    dir.join(format!("{}.{}", batch_id, ENTRY_EXTENSION))
}

async fn read_entry(path: &Path) -> Result<RetryCacheEntry, CacheError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn remove_file_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = ?path, error = %e, "Could not remove cache file");
    }
}

fn publish_gauges(state: &CacheState) {
    set_gauge(GaugeMetric::CacheEntries, state.entries.len() as f64);
    set_gauge(GaugeMetric::CacheBytes, state.total_bytes as f64);
}
