//! Task handlers — the asynchronous work a task performs on each run.

use std::future::Future;

use async_trait::async_trait;

use crate::output::TaskOutput;
use crate::tasks::{StateBag, TaskId};

/// What a handler sees of its task while running.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: TaskId,
    pub name: String,
    pub agent_id: Option<String>,
    /// 1 on the first run.
    pub run_count: u64,
    /// Private state; writes are visible to later runs and to snapshots.
    pub state: StateBag,
}

/// Asynchronous unit of work. An `Err` is recorded as a failed run; the task
/// is rescheduled on its normal interval either way.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskOutput>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F>(F);

/// Wrap `|ctx| async move { ... }` as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskOutput>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskOutput>> + Send,
{
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskOutput> {
        (self.0)(ctx).await
    }
}
