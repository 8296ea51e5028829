//! Persistent counter cache
//!
//! Holds the most recent `(value, timestamp)` per metric instance so a rate
//! can be computed on the next cycle, including the first cycle after a
//! restart. The whole mapping is rewritten atomically on every flush; a
//! missing or corrupt file is treated as an empty cache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default maximum number of tracked instances
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Last observation seen for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: u64,
    pub ts: i64,
}

/// Key-indexed store of previous counter observations
#[derive(Debug)]
pub struct CounterCache {
    entries: HashMap<String, CacheEntry>,
    path: Option<PathBuf>,
    max_entries: usize,
    dirty: bool,
}

impl CounterCache {
    /// In-memory cache with no backing file
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            path: None,
            max_entries: max_entries.max(1),
            dirty: false,
        }
    }

    /// Load the cache from `path`, starting empty on any read or parse failure
    pub fn load(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        if !path.exists() {
            info!(path = %path.display(), "No counter cache found, starting empty");
            return Self {
                path: Some(path),
                ..Self::in_memory(max_entries)
            };
        }

        match Self::try_load(&path, max_entries) {
            Ok(cache) => {
                info!(path = %path.display(), entries = cache.len(), "Loaded counter cache");
                cache
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load counter cache, starting empty"
                );
                Self {
                    path: Some(path),
                    ..Self::in_memory(max_entries)
                }
            }
        }
    }

    /// Like [`load`](Self::load), but surfaces read and parse failures
    pub fn try_load(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self {
            entries,
            path: Some(path),
            ..Self::in_memory(max_entries)
        })
    }

    pub fn get(&self, instance_id: &str) -> Option<&CacheEntry> {
        self.entries.get(instance_id)
    }

    /// Record the latest observation for an instance
    pub fn put(&mut self, instance_id: impl Into<String>, value: u64, ts: i64) {
        self.entries.insert(instance_id.into(), CacheEntry { value, ts });
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Iterate over all tracked entries
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries ordered by most recent observation first
    pub fn entries_by_recency(&self) -> Vec<(&str, &CacheEntry)> {
        let mut entries: Vec<_> = self.entries().collect();
        entries.sort_by(|a, b| b.1.ts.cmp(&a.1.ts).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// Drop the least-recently-updated entries until within `max_entries`.
    ///
    /// Returns the number of evicted entries.
    pub fn compact(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return 0;
        }

        let mut by_age: Vec<(i64, String)> = self
            .entries
            .iter()
            .map(|(id, entry)| (entry.ts, id.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, id) in by_age.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        self.dirty = true;

        debug!(evicted = excess, remaining = self.entries.len(), "Compacted counter cache");
        excess
    }

    /// Compact and persist the full mapping.
    ///
    /// Callers treat an error as non-fatal: the in-memory cache stays valid.
    pub fn flush(&mut self) -> Result<()> {
        self.compact();

        if !self.dirty {
            return Ok(());
        }

        if let Some(ref path) = self.path {
            write_entries(path, &self.entries)?;
            self.dirty = false;
            debug!(path = %path.display(), entries = self.entries.len(), "Counter cache flushed");
        }

        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, CacheEntry>> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read cache file {:?}", path))?;
    serde_json::from_slice(&data).context("Failed to deserialize cache data")
}

/// Write atomically via a temp file and rename
fn write_entries(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let json = serde_json::to_vec(entries).context("Failed to serialize cache")?;

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

    file.write_all(&json).context("Failed to write cache data")?;
    file.sync_all().context("Failed to sync cache file")?;

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}
