//! Built-in tasks declared under `[[builtin]]` in the config.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use syndicate_core::BuiltinTaskConfig;
use syndicate_scheduler::{TaskContext, TaskHandler, TaskOutput, TaskPriority, TaskSpec};

/// Counts its own runs in the `beats` state key.
pub struct HeartbeatHandler;

#[async_trait]
impl TaskHandler for HeartbeatHandler {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskOutput> {
        let beats = ctx.state.update(|state| {
            let beats = state.get("beats").and_then(Value::as_u64).unwrap_or(0) + 1;
            state.insert("beats".into(), json!(beats));
            beats
        });
        tracing::debug!("💓 Heartbeat '{}' #{}", ctx.name, beats);
        Ok(TaskOutput::value(json!({ "beats": beats })))
    }
}

/// Measures the bytes stored under `root`. Crossing `threshold` upward is
/// reported once as a `storage_growth` discovery.
pub struct DirUsageHandler {
    root: PathBuf,
    threshold: u64,
}

impl DirUsageHandler {
    pub fn new(root: &Path, threshold: u64) -> Self {
        Self {
            root: root.to_path_buf(),
            threshold,
        }
    }
}

#[async_trait]
impl TaskHandler for DirUsageHandler {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskOutput> {
        let bytes = dir_size(&self.root)
            .await
            .with_context(|| format!("cannot measure {}", self.root.display()))?;
        let over = bytes > self.threshold;
        let was_over = ctx
            .state
            .set("over_threshold", json!(over))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        ctx.state.set("bytes", json!(bytes));

        if over && !was_over {
            return Ok(TaskOutput::discovery(
                "storage_growth",
                json!({
                    "path": self.root.display().to_string(),
                    "bytes": bytes,
                    "thresholdBytes": self.threshold,
                }),
                0.8,
            ));
        }
        Ok(TaskOutput::value(json!({ "bytes": bytes })))
    }
}

/// Total size of regular files below `root`. A missing root counts as empty.
async fn dir_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

pub fn build_handler(
    config: &BuiltinTaskConfig,
    base_path: &Path,
) -> anyhow::Result<Arc<dyn TaskHandler>> {
    match config.kind.as_str() {
        "heartbeat" => Ok(Arc::new(HeartbeatHandler)),
        "dir_usage" => Ok(Arc::new(DirUsageHandler::new(base_path, config.threshold_bytes))),
        other => bail!("unknown builtin kind '{other}' for task '{}'", config.name),
    }
}

/// Turn a config entry into a registrable task.
pub fn build_spec(config: &BuiltinTaskConfig, base_path: &Path) -> anyhow::Result<TaskSpec> {
    let priority: TaskPriority = config
        .priority
        .parse()
        .map_err(|e| anyhow::anyhow!("task '{}': {e}", config.name))?;
    let mut spec = TaskSpec::new(&config.name)
        .priority(priority)
        .interval(Duration::from_millis(config.interval_ms))
        .handler_arc(build_handler(config, base_path)?);
    if let Some(description) = &config.description {
        spec = spec.description(description);
    }
    if let Some(agent_id) = &config.agent_id {
        spec = spec.agent(agent_id);
    }
    Ok(spec)
}
