//! Task definitions — the core data model for recurring background work.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::handler::TaskHandler;
use crate::history::BoundedLog;

/// Opaque task identifier, generated at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Scheduling priority (lower = more urgent).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
    Background = 4,
}

impl TaskPriority {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Critical => write!(f, "critical"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Background => write!(f, "background"),
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(TaskPriority::Critical),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            "background" => Ok(TaskPriority::Background),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Paused,
    /// Terminal state of a one-shot task whose handler succeeded.
    Completed,
    /// Terminal state of a one-shot task whose handler failed.
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a single run, as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One entry of a task's run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: RunStatus,
}

impl HistoryEntry {
    pub fn completed(timestamp: DateTime<Utc>, duration: Duration, result: Value) -> Self {
        Self {
            timestamp,
            duration_ms: duration_ms(duration),
            result: Some(result),
            error: None,
            status: RunStatus::Completed,
        }
    }

    pub fn failed(timestamp: DateTime<Utc>, duration: Duration, error: String) -> Self {
        Self {
            timestamp,
            duration_ms: duration_ms(duration),
            result: None,
            error: Some(error),
            status: RunStatus::Failed,
        }
    }
}

pub(crate) fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Handler-private mutable state, shared between the registry and running handlers.
#[derive(Debug, Clone, Default)]
pub struct StateBag(Arc<Mutex<Map<String, Value>>>);

impl StateBag {
    pub fn new(initial: Map<String, Value>) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Set a key, returning the previous value.
    pub fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.lock().insert(key.to_string(), value)
    }

    /// Mutate the whole map under one lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    pub fn replace(&self, state: Map<String, Value>) {
        *self.lock() = state;
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration request for a task.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: String,
    pub description: Option<String>,
    pub agent_id: Option<String>,
    pub priority: TaskPriority,
    pub interval: Duration,
    /// One-shot tasks run once and end in COMPLETED or FAILED.
    pub recurring: bool,
    pub state: Map<String, Value>,
    pub handler: Option<Arc<dyn TaskHandler>>,
}

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10_000);

impl TaskSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            agent_id: None,
            priority: TaskPriority::default(),
            interval: DEFAULT_INTERVAL,
            recurring: true,
            state: Map::new(),
            handler: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval_ms(self, ms: u64) -> Self {
        self.interval(Duration::from_millis(ms))
    }

    pub fn once(mut self) -> Self {
        self.recurring = false;
        self
    }

    pub fn state(mut self, key: &str, value: Value) -> Self {
        self.state.insert(key.to_string(), value);
        self
    }

    pub fn handler(mut self, handler: impl TaskHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn handler_arc(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("agent_id", &self.agent_id)
            .field("priority", &self.priority)
            .field("interval", &self.interval)
            .field("recurring", &self.recurring)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// A registered task. Owned by the registry for the process lifetime.
pub(crate) struct Task {
    pub id: TaskId,
    /// Registration order, used as the tie-break among equal priorities.
    pub seq: u64,
    pub name: String,
    pub description: Option<String>,
    pub agent_id: Option<String>,
    pub priority: TaskPriority,
    pub interval: Duration,
    pub recurring: bool,
    pub handler: Arc<dyn TaskHandler>,
    pub status: TaskStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub history: BoundedLog<HistoryEntry>,
    pub state: StateBag,
    /// A handler invocation is still executing (also true while PAUSED mid-run).
    pub in_flight: bool,
    pub run_count: u64,
}

impl Task {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Idle && !self.in_flight && self.next_run <= now
    }

    /// Dispatch time plus the interval.
    pub fn next_after(&self, dispatched_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|delta| dispatched_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            agent_id: self.agent_id.clone(),
            priority: self.priority,
            interval_ms: self.interval.as_millis() as u64,
            recurring: self.recurring,
            status: self.status,
            last_run: self.last_run,
            next_run: self.next_run,
            run_count: self.run_count,
            history: self.history.to_vec(),
            state: self.state.snapshot(),
        }
    }
}

/// Read-only view of a task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub description: Option<String>,
    pub agent_id: Option<String>,
    pub priority: TaskPriority,
    pub interval_ms: u64,
    pub recurring: bool,
    pub status: TaskStatus,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub next_run: DateTime<Utc>,
    pub run_count: u64,
    pub history: Vec<HistoryEntry>,
    pub state: Map<String, Value>,
}

/// Wall-clock now, truncated to whole milliseconds so persisted timestamps
/// compare equal after a round-trip.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical < TaskPriority::High);
        assert!(TaskPriority::Low < TaskPriority::Background);
        assert_eq!(TaskPriority::Critical.value(), 0);
        assert_eq!(TaskPriority::Background.value(), 4);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("CRITICAL".parse::<TaskPriority>(), Ok(TaskPriority::Critical));
        assert_eq!("background".parse::<TaskPriority>(), Ok(TaskPriority::Background));
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_task_id_roundtrip() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_spec_defaults() {
        let spec = TaskSpec::new("collect");
        assert_eq!(spec.priority, TaskPriority::Medium);
        assert_eq!(spec.interval, Duration::from_millis(10_000));
        assert!(spec.recurring);
        assert!(spec.handler.is_none());
    }

    #[test]
    fn test_history_entry_serialization() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let entry = HistoryEntry::failed(ts, Duration::from_millis(5), "boom".into());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "boom");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_state_bag_shared() {
        let bag = StateBag::default();
        let clone = bag.clone();
        clone.set("beats", json!(1));
        assert_eq!(bag.get("beats"), Some(json!(1)));
        bag.update(|m| {
            m.insert("beats".into(), json!(2));
        });
        assert_eq!(clone.snapshot()["beats"], 2);
    }

    #[test]
    fn test_now_millis_truncated() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
