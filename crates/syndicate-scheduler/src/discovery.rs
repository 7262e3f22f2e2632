//! Discovery log — noteworthy handler results, kept in one bounded list and
//! flushed to disk as full-list snapshots.
//!
//! ```text
//! <base>/discoveries/discoveries-2026-10-14T09-30-00-000Z.json   [Discovery, ...]
//! ```
//!
//! Each flush writes the complete current list (not a delta) and leaves the
//! in-memory list untouched. Loading reads only the newest file and replaces
//! the list wholesale.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use syndicate_core::Result;
use uuid::Uuid;

use crate::history::BoundedLog;
use crate::output::DiscoveryReport;
use crate::store;
use crate::tasks::{TaskId, now_millis};

pub const DISCOVERY_FILE_PREFIX: &str = "discoveries-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub task_id: TaskId,
    pub task_name: String,
    pub agent_id: Option<String>,
    #[serde(rename = "type")]
    pub discovery_type: String,
    pub data: Value,
    pub confidence: f64,
}

impl Discovery {
    pub fn new(
        task_id: TaskId,
        task_name: &str,
        agent_id: Option<&str>,
        report: DiscoveryReport,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            task_id,
            task_name: task_name.to_string(),
            agent_id: agent_id.map(str::to_string),
            discovery_type: report.discovery_type,
            data: report.data,
            confidence: report.confidence,
        }
    }
}

/// In-memory discovery list plus its snapshot directory.
pub struct DiscoveryLog {
    entries: BoundedLog<Discovery>,
    dir: PathBuf,
}

impl DiscoveryLog {
    pub fn new(dir: &Path, max_len: usize) -> Self {
        Self {
            entries: BoundedLog::new(max_len),
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&mut self, discovery: Discovery) {
        self.entries.push(discovery);
    }

    pub fn replace(&mut self, discoveries: Vec<Discovery>) {
        self.entries.replace(discoveries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> Vec<Discovery> {
        self.entries.to_vec()
    }

    /// Newest `limit` discoveries, oldest first.
    pub fn latest(&self, limit: usize) -> Vec<Discovery> {
        self.entries.latest(limit)
    }
}

/// Write a full snapshot of `discoveries`. Returns `None` when there is
/// nothing to write.
pub async fn save_snapshot(dir: &Path, discoveries: &[Discovery]) -> Result<Option<PathBuf>> {
    if discoveries.is_empty() {
        return Ok(None);
    }
    let file_name = store::snapshot_file_name(DISCOVERY_FILE_PREFIX, now_millis());
    let path = store::write_json(dir, &file_name, &discoveries).await?;
    Ok(Some(path))
}

/// Read the newest snapshot in `dir`, if any.
pub async fn load_latest_snapshot(dir: &Path) -> Result<Option<(PathBuf, Vec<Discovery>)>> {
    let Some(path) = store::latest_file(dir, DISCOVERY_FILE_PREFIX).await? else {
        return Ok(None);
    };
    let discoveries: Vec<Discovery> = store::read_json(&path).await?;
    Ok(Some((path, discoveries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(kind: &str) -> DiscoveryReport {
        DiscoveryReport {
            discovery_type: kind.into(),
            data: json!({"kind": kind}),
            confidence: 0.7,
        }
    }

    #[test]
    fn test_serialized_shape() {
        let d = Discovery::new(TaskId::new(), "scanner", Some("agent-7"), report("spread"));
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["type"], "spread");
        assert_eq!(value["taskName"], "scanner");
        assert_eq!(value["agentId"], "agent-7");
        assert_eq!(value["confidence"], 0.7);
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_log_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = DiscoveryLog::new(dir.path(), 2);
        for kind in ["a", "b", "c"] {
            log.record(Discovery::new(TaskId::new(), "t", None, report(kind)));
        }
        let kinds: Vec<_> = log.all().into_iter().map(|d| d.discovery_type).collect();
        assert_eq!(kinds, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_save_empty_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_snapshot(dir.path(), &[]).await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let list = vec![Discovery::new(TaskId::new(), "t", None, report("x"))];
        let path = save_snapshot(dir.path(), &list).await.unwrap().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(DISCOVERY_FILE_PREFIX));
        assert!(!name.contains(':'));

        let (loaded_path, loaded) = load_latest_snapshot(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded_path, path);
        assert_eq!(loaded, list);
    }

    #[tokio::test]
    async fn test_load_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("discoveries");
        assert!(load_latest_snapshot(&missing).await.unwrap().is_none());
    }
}
