//! Counter cache inspection

use crate::output::{format_timestamp, print_info, print_listing, OutputFormat};
use anyhow::{bail, Context, Result};
use netmon_lib::cache::{CacheEntry, CounterCache, DEFAULT_MAX_ENTRIES};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Value")]
    value: u64,
    #[tabled(rename = "Updated (UTC)")]
    updated: String,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Debug, Serialize)]
struct CacheEntryView<'a> {
    instance_id: &'a str,
    value: u64,
    ts: i64,
}

/// Compact age such as `42s`, `5m`, `3h` or `2d`
fn format_age(secs: i64) -> String {
    match secs {
        s if s < 0 => "in future".to_string(),
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

fn newest<'a>(cache: &'a CounterCache, limit: usize) -> Vec<(&'a str, &'a CacheEntry)> {
    let mut entries = cache.entries_by_recency();
    entries.truncate(limit);
    entries
}

/// Show the most recently updated entries of a counter cache file
pub fn inspect_cache(path: &Path, limit: usize, format: OutputFormat) -> Result<()> {
    if !path.exists() {
        bail!("Cache file {:?} does not exist", path);
    }
    let cache = CounterCache::try_load(path, DEFAULT_MAX_ENTRIES)
        .with_context(|| format!("Cannot inspect {:?}", path))?;

    let now = chrono::Utc::now().timestamp();
    let entries = newest(&cache, limit);

    let rows: Vec<CacheRow> = entries
        .iter()
        .map(|(id, entry)| CacheRow {
            instance: id.to_string(),
            value: entry.value,
            updated: format_timestamp(entry.ts),
            age: format_age(now - entry.ts),
        })
        .collect();
    let views: Vec<CacheEntryView> = entries
        .iter()
        .map(|(id, entry)| CacheEntryView {
            instance_id: id,
            value: entry.value,
            ts: entry.ts,
        })
        .collect();

    print_listing(rows, &views, format);
    if format == OutputFormat::Table {
        print_info(&format!(
            "Showing {} of {} tracked instances",
            views.len(),
            cache.len()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(-5), "in future");
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(300), "5m");
        assert_eq!(format_age(3 * 3600 + 59), "3h");
        assert_eq!(format_age(2 * 86_400), "2d");
    }

    #[test]
    fn test_newest_entries_first_and_limited() {
        let mut cache = CounterCache::in_memory(10);
        cache.put("10001", 5, 100);
        cache.put("10002", 6, 300);
        cache.put("10003", 7, 200);

        let ids: Vec<&str> = newest(&cache, 2).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["10002", "10003"]);
    }

    #[test]
    fn test_inspect_missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json");
        assert_err!(inspect_cache(&missing, 10, OutputFormat::Json));

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, b"{oops").unwrap();
        assert_err!(inspect_cache(&corrupt, 10, OutputFormat::Json));
    }

    #[test]
    fn test_inspect_flushed_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter_cache.json");
        let mut cache = CounterCache::load(&path, 10);
        cache.put("10001", 1500, 130);
        cache.flush().unwrap();

        assert_ok!(inspect_cache(&path, 10, OutputFormat::Json));
    }
}
