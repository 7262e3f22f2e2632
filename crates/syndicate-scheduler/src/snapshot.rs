//! Per-task state snapshots: `<base>/states/task-<id>-<timestamp>.json`.
//! Files are never rewritten or pruned.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use syndicate_core::Result;

use crate::store;
use crate::tasks::{TaskId, TaskStatus, now_millis};

/// Point-in-time export of one task's scheduling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStateSnapshot {
    pub id: TaskId,
    pub name: String,
    pub agent_id: Option<String>,
    pub status: TaskStatus,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub next_run: DateTime<Utc>,
    #[serde(default)]
    pub state: Map<String, Value>,
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn prefix(id: &TaskId) -> String {
        format!("task-{id}-")
    }

    pub async fn save(&self, snapshot: &TaskStateSnapshot) -> Result<PathBuf> {
        let file_name = store::snapshot_file_name(&Self::prefix(&snapshot.id), now_millis());
        store::write_json(&self.dir, &file_name, snapshot).await
    }

    /// Newest snapshot for `id`, or `None` if it was never saved.
    pub async fn load_latest(&self, id: &TaskId) -> Result<Option<TaskStateSnapshot>> {
        match store::latest_file(&self.dir, &Self::prefix(id)).await? {
            Some(path) => Ok(Some(store::read_json(&path).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(id: TaskId, beats: u64) -> TaskStateSnapshot {
        let mut state = Map::new();
        state.insert("beats".into(), json!(beats));
        TaskStateSnapshot {
            id,
            name: "heartbeat".into(),
            agent_id: Some("ops".into()),
            status: TaskStatus::Idle,
            last_run: Some(now_millis()),
            next_run: now_millis(),
            state,
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(&dir.path().join("states"));
        let snap = snapshot(TaskId::new(), 3);
        let path = store.save(&snap).await.unwrap();
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&format!("task-{}-", snap.id))
        );

        let loaded = store.load_latest(&snap.id).await.unwrap().unwrap();
        assert_eq!(loaded, snap);
    }

    #[tokio::test]
    async fn test_load_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load_latest(&TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_picks_newest_for_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let id = TaskId::new();
        let other = TaskId::new();

        for (stamp, beats) in [("2026-01-01T00-00-00-000Z", 1), ("2026-03-01T00-00-00-000Z", 3)] {
            let json = serde_json::to_string(&snapshot(id, beats)).unwrap();
            std::fs::write(dir.path().join(format!("task-{id}-{stamp}.json")), json).unwrap();
        }
        let json = serde_json::to_string(&snapshot(other, 99)).unwrap();
        std::fs::write(
            dir.path().join(format!("task-{other}-2030-01-01T00-00-00-000Z.json")),
            json,
        )
        .unwrap();

        let loaded = store.load_latest(&id).await.unwrap().unwrap();
        assert_eq!(loaded.state["beats"], 3);
    }
}
