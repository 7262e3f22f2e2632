//! Task events broadcast to any subscriber (dashboards, orchestrators,
//! long-term discovery stores).

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::discovery::Discovery;
use crate::tasks::TaskId;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum TaskEvent {
    TaskCompleted(TaskCompletion),
    /// Emitted after `TaskCompleted` for tasks owned by an agent.
    AgentTaskCompleted(TaskCompletion),
    TaskFailed(TaskFailure),
    DiscoveryRecorded(Discovery),
    DiscoveriesLoaded { count: usize, file: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub id: TaskId,
    pub name: String,
    pub agent_id: Option<String>,
    pub duration_ms: f64,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    pub id: TaskId,
    pub name: String,
    pub agent_id: Option<String>,
    pub error: String,
}

/// Broadcast fan-out of [`TaskEvent`]s. Publishing never blocks and never
/// fails; events sent with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: TaskEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
