//! File-backed result cache with a time-to-live.
//!
//! One JSON file per [`ConfluenceCacheKey`], named by the key's digest. An
//! entry records when it was stored; reads past the TTL delete the file and
//! report a miss. All timestamps are passed in, so expiry is testable without
//! sleeping.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use confluence_core::{ConfluenceCacheKey, ConfluenceRecord, ConfluenceResult};

/// What is written to disk for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: ConfluenceCacheKey,
    pub stored_at: DateTime<Utc>,
    pub record: ConfluenceRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl ResultCache {
    /// Open (and create) a cache directory. A zero TTL makes every entry
    /// stale on arrival.
    pub fn new(cache_dir: impl AsRef<Path>, ttl_secs: u64) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create cache directory {}", cache_dir.display()))?;
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
        let ttl = Duration::seconds(secs);
        Ok(Self { cache_dir, ttl })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.stored_at < self.ttl
    }

    /// Fresh result for `key`, or `None`. Expired entries are removed.
    pub fn get(&self, key: &ConfluenceCacheKey, now: DateTime<Utc>) -> Result<Option<ConfluenceResult>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let entry = read_entry(&path)?;
        if entry.key != *key {
            // Digest collision or a hand-edited file: treat as a miss.
            debug!(key = %key, found = %entry.key, "cache entry key mismatch");
            return Ok(None);
        }
        if !self.is_fresh(&entry, now) {
            debug!(key = %key, stored_at = %entry.stored_at, "cache entry expired");
            self.remove(key)?;
            return Ok(None);
        }
        let result = ConfluenceResult::try_from(entry.record)
            .with_context(|| format!("invalid cached record in {}", path.display()))?;
        Ok(Some(result))
    }

    pub fn put(&self, key: &ConfluenceCacheKey, result: &ConfluenceResult, now: DateTime<Utc>) -> Result<()> {
        let entry = CacheEntry {
            key: key.clone(),
            stored_at: now,
            record: result.to_record(),
        };
        let json = serde_json::to_string_pretty(&entry).context("failed to serialize cache entry")?;
        let path = self.entry_path(key);
        // Write then rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("failed to move {} into place", tmp.display()))?;
        Ok(())
    }

    pub fn contains(&self, key: &ConfluenceCacheKey) -> bool {
        self.entry_path(key).exists()
    }

    pub fn remove(&self, key: &ConfluenceCacheKey) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Delete expired entries, and entries that no longer parse.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let stale = match read_entry(&path) {
                Ok(entry) => !self.is_fresh(&entry, now),
                Err(_) => true,
            };
            if stale {
                std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for path in self.entry_files()? {
            stats.entries += 1;
            stats.bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if read_entry(&path).map_or(true, |e| !self.is_fresh(&e, now)) {
                stats.expired += 1;
            }
        }
        Ok(stats)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entry_files()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn entry_path(&self, key: &ConfluenceCacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key.hash()))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let dir = std::fs::read_dir(&self.cache_dir)
            .with_context(|| format!("failed to list {}", self.cache_dir.display()))?;
        Ok(dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect())
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry> {
    let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse cache entry {}", path.display()))
}
