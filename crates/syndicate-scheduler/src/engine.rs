//! Background Task Manager — the polling loop that dispatches due tasks.
//!
//! Every tick (100ms by default) the manager takes the IDLE tasks whose
//! `next_run` has passed, sorts them by priority, and starts as many as the
//! global concurrency cap allows. Runs are fire-and-forget: the tick never
//! waits for a handler. A second loop flushes the discovery log to disk.
//!
//! ```text
//! tick loop (100ms) ──► registry.due() ──► begin_run ──► tokio::spawn(run)
//!                                                          │
//!                  history + reschedule ◄── finish_run ◄───┘
//!                  discovery log / events
//! flush loop (60s) ──► discoveries/discoveries-<ts>.json
//! ```

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use syndicate_core::{Result, TaskManagerConfig};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::discovery::{self, Discovery, DiscoveryLog};
use crate::events::{EventBus, TaskCompletion, TaskEvent, TaskFailure};
use crate::output::DiscoveryReport;
use crate::registry::TaskRegistry;
use crate::runner::{self, Dispatch};
use crate::snapshot::{SnapshotStore, TaskStateSnapshot};
use crate::tasks::{HistoryEntry, TaskId, TaskInfo, TaskSpec, TaskStatus, now_millis};

/// Manages recurring background tasks. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BackgroundTaskManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: TaskManagerConfig,
    registry: Mutex<TaskRegistry>,
    discoveries: Mutex<DiscoveryLog>,
    snapshots: SnapshotStore,
    events: EventBus,
    loops: StdMutex<Option<SchedulerLoops>>,
}

struct SchedulerLoops {
    tick: JoinHandle<()>,
    flush: JoinHandle<()>,
}

/// Counts by status, like the lane stats of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub total: usize,
    pub idle: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub discoveries: usize,
    pub is_running: bool,
}

impl BackgroundTaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        let discoveries = DiscoveryLog::new(&config.discoveries_dir(), config.max_history_length);
        let snapshots = SnapshotStore::new(&config.states_dir());
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(TaskRegistry::new(config.max_history_length)),
                discoveries: Mutex::new(discoveries),
                snapshots,
                events: EventBus::default(),
                loops: StdMutex::new(None),
                config,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    // ─── Registry ─────────────────────────────────────────────

    /// Register a task. It is IDLE and due immediately.
    pub async fn register_task(&self, spec: TaskSpec) -> Result<TaskId> {
        let name = spec.name.clone();
        let priority = spec.priority;
        let interval = spec.interval;
        let id = self.inner.registry.lock().await.register(spec, now_millis())?;
        tracing::info!(
            "📅 Task registered: '{}' ({}, priority {}, every {}ms)",
            name,
            id,
            priority,
            interval.as_millis()
        );
        Ok(id)
    }

    pub async fn get_task(&self, id: &TaskId) -> Option<TaskInfo> {
        self.inner.registry.lock().await.get(id).map(|t| t.info())
    }

    pub async fn all_tasks(&self) -> Vec<TaskInfo> {
        self.inner.registry.lock().await.infos()
    }

    pub async fn tasks_by_agent(&self, agent_id: &str) -> Vec<TaskInfo> {
        self.inner.registry.lock().await.infos_by_agent(agent_id)
    }

    pub async fn stats(&self) -> ManagerStats {
        let registry = self.inner.registry.lock().await;
        let discoveries = self.inner.discoveries.lock().await.len();
        ManagerStats {
            total: registry.len(),
            idle: registry.count_status(TaskStatus::Idle),
            running: registry.count_status(TaskStatus::Running),
            paused: registry.count_status(TaskStatus::Paused),
            completed: registry.count_status(TaskStatus::Completed),
            failed: registry.count_status(TaskStatus::Failed),
            discoveries,
            is_running: self.is_running(),
        }
    }

    // ─── Scheduler loop ───────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.loops().is_some()
    }

    /// Load the newest discovery snapshot and start the tick and flush loops.
    /// No-op if already started.
    pub async fn start(&self) {
        if self.is_running() {
            tracing::debug!("Task manager already running");
            return;
        }
        self.load_discoveries().await;

        let mut loops = self.loops();
        if loops.is_some() {
            return;
        }
        let tick_every = Duration::from_millis(self.inner.config.tick_interval_ms.max(1));
        let flush_every = Duration::from_secs(self.inner.config.discovery_flush_secs.max(1));
        let weak = Arc::downgrade(&self.inner);
        *loops = Some(SchedulerLoops {
            tick: tokio::spawn(tick_loop(weak.clone(), tick_every)),
            flush: tokio::spawn(flush_loop(weak, flush_every)),
        });
        tracing::info!(
            "⏰ Task manager started (tick every {}ms, max {} concurrent)",
            tick_every.as_millis(),
            self.inner.config.max_concurrent_tasks
        );
    }

    /// Stop both loops. In-flight runs finish and are still recorded.
    pub fn stop(&self) {
        if let Some(loops) = self.loops().take() {
            loops.tick.abort();
            loops.flush.abort();
            tracing::info!("🛑 Task manager stopped");
        }
    }

    /// One scheduling pass. Returns the ids dispatched, in dispatch order.
    pub async fn tick(&self) -> Vec<TaskId> {
        let now = now_millis();
        let dispatches: Vec<Dispatch> = {
            let mut registry = self.inner.registry.lock().await;
            let available = self
                .inner
                .config
                .max_concurrent_tasks
                .saturating_sub(registry.in_flight_count());
            if available == 0 {
                return Vec::new();
            }
            let mut due = registry.due(now);
            due.truncate(available);
            due.iter()
                .filter_map(|id| registry.begin_run(id, now))
                .collect()
        };

        let ids: Vec<TaskId> = dispatches.iter().map(|d| d.context.id).collect();
        for dispatch in dispatches {
            tracing::debug!(
                "🔔 Task triggered: '{}' (run #{})",
                dispatch.context.name,
                dispatch.context.run_count
            );
            tokio::spawn(self.clone().run_dispatched(dispatch));
        }
        ids
    }

    async fn run_dispatched(self, dispatch: Dispatch) {
        let outcome = runner::execute(&dispatch).await;
        let finished_at = now_millis();
        let ctx = &dispatch.context;
        let duration_ms = crate::tasks::duration_ms(outcome.duration);

        match outcome.result {
            Ok(output) => {
                let entry =
                    HistoryEntry::completed(finished_at, outcome.duration, output.value.clone());
                self.inner
                    .registry
                    .lock()
                    .await
                    .finish_run(&ctx.id, dispatch.dispatched_at, entry, true);
                tracing::debug!("✅ Task completed: '{}' in {:.1}ms", ctx.name, duration_ms);

                if let Some(report) = output.discovery {
                    self.record_discovery(&ctx.id, &ctx.name, ctx.agent_id.as_deref(), report)
                        .await;
                }

                let completion = TaskCompletion {
                    id: ctx.id,
                    name: ctx.name.clone(),
                    agent_id: ctx.agent_id.clone(),
                    duration_ms,
                    result: output.value,
                };
                let agent_owned = completion.agent_id.is_some();
                self.inner
                    .events
                    .publish(TaskEvent::TaskCompleted(completion.clone()));
                if agent_owned {
                    self.inner
                        .events
                        .publish(TaskEvent::AgentTaskCompleted(completion));
                }
            }
            Err(error) => {
                let entry = HistoryEntry::failed(finished_at, outcome.duration, error.clone());
                self.inner
                    .registry
                    .lock()
                    .await
                    .finish_run(&ctx.id, dispatch.dispatched_at, entry, false);
                tracing::warn!("⚠️ Task failed: '{}' ({}): {}", ctx.name, ctx.id, error);
                self.inner.events.publish(TaskEvent::TaskFailed(TaskFailure {
                    id: ctx.id,
                    name: ctx.name.clone(),
                    agent_id: ctx.agent_id.clone(),
                    error,
                }));
            }
        }
    }

    // ─── Pause / resume ───────────────────────────────────────

    /// RUNNING → PAUSED. Any other status (or an unknown id) returns false.
    pub async fn pause_task(&self, id: &TaskId) -> bool {
        let mut registry = self.inner.registry.lock().await;
        match registry.get_mut(id) {
            Some(task) if task.status == TaskStatus::Running => {
                task.status = TaskStatus::Paused;
                tracing::info!("⏸️ Task paused: '{}'", task.name);
                true
            }
            _ => false,
        }
    }

    /// PAUSED → IDLE, due on the next tick.
    pub async fn resume_task(&self, id: &TaskId) -> bool {
        let mut registry = self.inner.registry.lock().await;
        match registry.get_mut(id) {
            Some(task) if task.status == TaskStatus::Paused => {
                task.status = TaskStatus::Idle;
                task.next_run = now_millis();
                tracing::info!("▶️ Task resumed: '{}'", task.name);
                true
            }
            _ => false,
        }
    }

    pub async fn pause_all_tasks(&self) -> usize {
        let ids = self.ids_with_status(TaskStatus::Running).await;
        let mut count = 0;
        for id in ids {
            if self.pause_task(&id).await {
                count += 1;
            }
        }
        count
    }

    pub async fn resume_all_tasks(&self) -> usize {
        let ids = self.ids_with_status(TaskStatus::Paused).await;
        let mut count = 0;
        for id in ids {
            if self.resume_task(&id).await {
                count += 1;
            }
        }
        count
    }

    async fn ids_with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.inner
            .registry
            .lock()
            .await
            .ordered()
            .into_iter()
            .filter(|t| t.status == status)
            .map(|t| t.id)
            .collect()
    }

    // ─── Discoveries ──────────────────────────────────────────

    async fn record_discovery(
        &self,
        task_id: &TaskId,
        task_name: &str,
        agent_id: Option<&str>,
        report: DiscoveryReport,
    ) -> Discovery {
        let discovery = Discovery::new(*task_id, task_name, agent_id, report);
        self.inner.discoveries.lock().await.record(discovery.clone());
        tracing::info!(
            "💡 Discovery recorded: '{}' from '{}' (confidence {:.2})",
            discovery.discovery_type,
            task_name,
            discovery.confidence
        );
        self.inner
            .events
            .publish(TaskEvent::DiscoveryRecorded(discovery.clone()));
        discovery
    }

    /// Newest `limit` discoveries, oldest first.
    pub async fn discoveries(&self, limit: usize) -> Vec<Discovery> {
        self.inner.discoveries.lock().await.latest(limit)
    }

    /// Write the full discovery list to a new snapshot file. The in-memory
    /// list is kept. Returns `None` when the list is empty.
    pub async fn save_discoveries(&self) -> Result<Option<std::path::PathBuf>> {
        let (dir, list) = {
            let log = self.inner.discoveries.lock().await;
            if log.is_empty() {
                return Ok(None);
            }
            (log.dir().to_path_buf(), log.all())
        };
        let saved = discovery::save_snapshot(&dir, &list).await?;
        if let Some(path) = &saved {
            tracing::debug!("💾 Saved {} discoveries to {}", list.len(), path.display());
        }
        Ok(saved)
    }

    /// Replace the in-memory list with the newest snapshot on disk.
    /// Best-effort: returns the number loaded, 0 when nothing is there.
    pub async fn load_discoveries(&self) -> usize {
        let dir = self.inner.config.discoveries_dir();
        match discovery::load_latest_snapshot(&dir).await {
            Ok(Some((file, list))) => {
                let count = {
                    let mut log = self.inner.discoveries.lock().await;
                    log.replace(list);
                    log.len()
                };
                tracing::info!("📂 Loaded {} discoveries from {}", count, file.display());
                self.inner
                    .events
                    .publish(TaskEvent::DiscoveriesLoaded { count, file });
                count
            }
            Ok(None) => 0,
            Err(e) if e.is_not_found() => 0,
            Err(e) => {
                tracing::warn!("⚠️ Failed to load discoveries: {e}");
                0
            }
        }
    }

    // ─── State snapshots ──────────────────────────────────────

    /// Write a snapshot of one task. Errors are logged, not returned.
    pub async fn save_task_state(&self, id: &TaskId) -> bool {
        let snapshot = {
            let registry = self.inner.registry.lock().await;
            let Some(task) = registry.get(id) else {
                tracing::warn!("⚠️ Cannot save state of unknown task {id}");
                return false;
            };
            TaskStateSnapshot {
                id: task.id,
                name: task.name.clone(),
                agent_id: task.agent_id.clone(),
                status: task.status,
                last_run: task.last_run,
                next_run: task.next_run,
                state: task.state.snapshot(),
            }
        };
        match self.inner.snapshots.save(&snapshot).await {
            Ok(path) => {
                tracing::debug!("💾 Saved state of '{}' to {}", snapshot.name, path.display());
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to save state of '{}': {e}", snapshot.name);
                false
            }
        }
    }

    /// Newest snapshot of a task. Does not touch the live task.
    pub async fn load_task_state(&self, id: &TaskId) -> Option<TaskStateSnapshot> {
        match self.inner.snapshots.load_latest(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("⚠️ Failed to load state of task {id}: {e}");
                None
            }
        }
    }

    /// Copy the `state` bag of the newest snapshot into the live task.
    /// Status and timestamps are left alone.
    pub async fn restore_task_state(&self, id: &TaskId) -> bool {
        let Some(snapshot) = self.load_task_state(id).await else {
            return false;
        };
        let registry = self.inner.registry.lock().await;
        match registry.get(id) {
            Some(task) => {
                task.state.replace(snapshot.state);
                tracing::info!("♻️ Restored state of '{}'", task.name);
                true
            }
            None => false,
        }
    }

    /// Stop the loops, flush discoveries and snapshot every task.
    /// Failures are logged per item.
    pub async fn cleanup(&self) {
        self.stop();
        if let Err(e) = self.save_discoveries().await {
            tracing::warn!("⚠️ Failed to save discoveries during cleanup: {e}");
        }
        let ids: Vec<TaskId> = self.all_tasks().await.into_iter().map(|t| t.id).collect();
        let saves = ids.iter().map(|id| self.save_task_state(id));
        let saved = futures::future::join_all(saves)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        tracing::info!("🧹 Cleanup done: saved state of {}/{} tasks", saved, ids.len());
    }

    fn loops(&self) -> MutexGuard<'_, Option<SchedulerLoops>> {
        self.inner
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn tick_loop(inner: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else { break };
        BackgroundTaskManager { inner }.tick().await;
    }
}

async fn flush_loop(inner: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else { break };
        if let Err(e) = (BackgroundTaskManager { inner }).save_discoveries().await {
            tracing::warn!("⚠️ Failed to flush discoveries: {e}");
        }
    }
}
