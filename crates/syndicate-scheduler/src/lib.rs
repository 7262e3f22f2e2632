//! # Syndicate Scheduler
//!
//! In-process background task manager for long-running agents.
//!
//! Tasks are recurring async handlers with a priority and an interval. A
//! tick loop dispatches due tasks in priority order under a global
//! concurrency cap; each run is recorded in a bounded per-task history.
//! Results flagged as discoveries go to a shared log that is periodically
//! flushed to JSON files, and task state can be snapshotted to disk.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            BackgroundTaskManager              │
//! ├───────────────┬───────────────┬───────────────┤
//! │ TaskRegistry  │ DiscoveryLog  │ SnapshotStore │
//! │ (tasks, due)  │ (bounded)     │ (states/)     │
//! ├───────────────┴───────────────┴───────────────┤
//! │ runner: one tokio task per run, panic-safe    │
//! ├───────────────────────────────────────────────┤
//! │ EventBus: completed / failed / discovery      │
//! └───────────────────────────────────────────────┘
//! ```

pub mod discovery;
pub mod engine;
pub mod events;
pub mod handler;
pub mod history;
pub mod output;
mod registry;
mod runner;
pub mod snapshot;
pub mod store;
pub mod tasks;

pub use discovery::Discovery;
pub use engine::{BackgroundTaskManager, ManagerStats};
pub use events::{EventBus, TaskCompletion, TaskEvent, TaskFailure};
pub use handler::{TaskContext, TaskHandler, handler_fn};
pub use output::{DiscoveryReport, TaskOutput};
pub use snapshot::TaskStateSnapshot;
pub use tasks::{
    HistoryEntry, RunStatus, StateBag, TaskId, TaskInfo, TaskPriority, TaskSpec, TaskStatus,
    now_millis,
};
