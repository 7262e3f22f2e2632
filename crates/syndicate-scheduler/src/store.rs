//! File-based JSON snapshot store — lightweight persistence.
//! Every write lands in a new file named `<prefix><timestamp>-<seq>.json`;
//! readers pick the lexicographically last match, which is the newest one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use syndicate_core::Result;

/// ISO-8601 timestamp safe for file names (`:` and `.` replaced by `-`).
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh file name for a snapshot taken at `at`. The zero-padded sequence
/// keeps names distinct within one millisecond and sorts them by creation.
pub fn snapshot_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{}-{seq:010}.json", timestamp_slug(at))
}

/// Serialize `value` to `dir/file_name`, creating `dir` if needed.
pub async fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(&path, json).await?;
    tracing::debug!("💾 Wrote {}", path.display());
    Ok(path)
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}

/// Newest file in `dir` whose name starts with `prefix` and ends with `.json`.
/// The directory is created first, so a fresh layout yields `Ok(None)`.
pub async fn latest_file(dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(".json") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names.pop().map(|name| dir.join(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_slug() {
        let at = DateTime::from_timestamp_millis(1_760_443_200_123).unwrap();
        assert_eq!(timestamp_slug(at), "2025-10-14T12-00-00-123Z");
    }

    #[test]
    fn test_slug_sorts_chronologically() {
        let earlier = DateTime::from_timestamp_millis(1_760_443_200_999).unwrap();
        let later = DateTime::from_timestamp_millis(1_760_443_201_000).unwrap();
        assert!(timestamp_slug(earlier) < timestamp_slug(later));
    }

    #[test]
    fn test_snapshot_names_are_distinct_and_ordered() {
        let at = DateTime::from_timestamp_millis(1_760_443_200_123).unwrap();
        let first = snapshot_file_name("task-x-", at);
        let second = snapshot_file_name("task-x-", at);
        assert_ne!(first, second);
        assert!(first < second);
        assert!(first.starts_with("task-x-2025-10-14T12-00-00-123Z-"));
        assert!(first.ends_with(".json"));
    }

    #[tokio::test]
    async fn test_latest_file_picks_last() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a-2024.json", "a-2026.json", "a-2025.json", "b-2030.json", "a-2099.txt"] {
            std::fs::write(dir.path().join(name), "[]").unwrap();
        }
        let latest = latest_file(dir.path(), "a-").await.unwrap().unwrap();
        assert_eq!(latest.file_name().unwrap(), "a-2026.json");
    }

    #[tokio::test]
    async fn test_latest_file_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not").join("yet");
        assert!(latest_file(&missing, "x-").await.unwrap().is_none());
        assert!(missing.exists());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(&dir.path().join("sub"), "v.json", &vec![1, 2, 3])
            .await
            .unwrap();
        let back: Vec<i32> = read_json(&path).await.unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
