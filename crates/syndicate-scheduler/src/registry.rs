//! Task registry — owns every registered task for the process lifetime.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use syndicate_core::{Result, SyndicateError};

use crate::handler::TaskContext;
use crate::history::BoundedLog;
use crate::runner::Dispatch;
use crate::tasks::{HistoryEntry, StateBag, Task, TaskId, TaskInfo, TaskSpec, TaskStatus};

pub(crate) struct TaskRegistry {
    tasks: HashMap<TaskId, Task>,
    next_seq: u64,
    max_history: usize,
}

impl TaskRegistry {
    pub fn new(max_history: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            next_seq: 0,
            max_history,
        }
    }

    /// Validate and store a new IDLE task, due immediately.
    pub fn register(&mut self, spec: TaskSpec, now: DateTime<Utc>) -> Result<TaskId> {
        if spec.name.trim().is_empty() {
            return Err(SyndicateError::InvalidTask("task name is required".into()));
        }
        let Some(handler) = spec.handler else {
            return Err(SyndicateError::InvalidTask(format!(
                "task '{}' has no handler",
                spec.name
            )));
        };

        let id = TaskId::new();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.insert(
            id,
            Task {
                id,
                seq,
                name: spec.name,
                description: spec.description,
                agent_id: spec.agent_id,
                priority: spec.priority,
                interval: spec.interval,
                recurring: spec.recurring,
                handler,
                status: TaskStatus::Idle,
                last_run: None,
                next_run: now,
                history: BoundedLog::new(self.max_history),
                state: StateBag::new(spec.state),
                in_flight: false,
                run_count: 0,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// All tasks in registration order.
    pub fn ordered(&self) -> Vec<&Task> {
        let mut tasks: Vec<_> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    pub fn infos(&self) -> Vec<TaskInfo> {
        self.ordered().into_iter().map(Task::info).collect()
    }

    pub fn infos_by_agent(&self, agent_id: &str) -> Vec<TaskInfo> {
        self.ordered()
            .into_iter()
            .filter(|t| t.agent_id.as_deref() == Some(agent_id))
            .map(Task::info)
            .collect()
    }

    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    /// Handlers currently executing, including those of tasks paused mid-run.
    pub fn in_flight_count(&self) -> usize {
        self.tasks.values().filter(|t| t.in_flight).count()
    }

    /// Idle, due tasks ordered by (priority, registration order).
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut due: Vec<_> = self.tasks.values().filter(|t| t.is_due(now)).collect();
        due.sort_by_key(|t| (t.priority, t.seq));
        due.into_iter().map(|t| t.id).collect()
    }

    /// Mark a task RUNNING and hand back what the runner needs.
    pub fn begin_run(&mut self, id: &TaskId, now: DateTime<Utc>) -> Option<Dispatch> {
        let task = self.tasks.get_mut(id)?;
        task.status = TaskStatus::Running;
        task.last_run = Some(now);
        task.in_flight = true;
        task.run_count += 1;
        Some(Dispatch {
            handler: task.handler.clone(),
            context: TaskContext {
                id: task.id,
                name: task.name.clone(),
                agent_id: task.agent_id.clone(),
                run_count: task.run_count,
                state: task.state.clone(),
            },
            dispatched_at: now,
        })
    }

    /// Record a finished run and reschedule at `dispatched_at + interval`.
    ///
    /// Recurring tasks return to IDLE unless they were paused mid-run;
    /// one-shot tasks end in COMPLETED or FAILED.
    pub fn finish_run(
        &mut self,
        id: &TaskId,
        dispatched_at: DateTime<Utc>,
        entry: HistoryEntry,
        succeeded: bool,
    ) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        task.in_flight = false;
        task.next_run = task.next_after(dispatched_at);
        task.history.push(entry);

        if !task.recurring {
            task.status = if succeeded {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
        } else if task.status == TaskStatus::Running {
            task.status = TaskStatus::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::output::TaskOutput;
    use crate::tasks::{TaskPriority, now_millis};
    use std::time::Duration;

    fn spec(name: &str, priority: TaskPriority) -> TaskSpec {
        TaskSpec::new(name)
            .priority(priority)
            .handler(handler_fn(|_ctx| async { Ok(TaskOutput::empty()) }))
    }

    #[test]
    fn test_register_requires_name_and_handler() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        assert!(matches!(
            reg.register(TaskSpec::new("  "), now),
            Err(SyndicateError::InvalidTask(_))
        ));
        assert!(matches!(
            reg.register(TaskSpec::new("no-handler"), now),
            Err(SyndicateError::InvalidTask(_))
        ));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn test_register_defaults() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        let id = reg.register(spec("t", TaskPriority::Medium), now).unwrap();
        let task = reg.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Idle);
        assert_eq!(task.next_run, now);
        assert!(task.last_run.is_none());
        assert!(task.is_due(now));
    }

    #[test]
    fn test_due_sorted_by_priority_then_registration() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        let low = reg.register(spec("low", TaskPriority::Low), now).unwrap();
        let crit = reg.register(spec("crit", TaskPriority::Critical), now).unwrap();
        let low2 = reg.register(spec("low2", TaskPriority::Low), now).unwrap();
        let high = reg.register(spec("high", TaskPriority::High), now).unwrap();
        assert_eq!(reg.due(now), vec![crit, high, low, low2]);
    }

    #[test]
    fn test_not_due_while_in_flight_or_early() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        let id = reg.register(spec("t", TaskPriority::High), now).unwrap();
        let dispatch = reg.begin_run(&id, now).unwrap();
        assert_eq!(dispatch.context.run_count, 1);
        assert!(reg.due(now).is_empty());
        assert_eq!(reg.in_flight_count(), 1);

        let entry = HistoryEntry::completed(now, Duration::ZERO, serde_json::Value::Null);
        reg.finish_run(&id, now, entry, true);
        let task = reg.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Idle);
        assert_eq!(task.next_run, now + chrono::Duration::seconds(10));
        assert!(reg.due(now).is_empty());
        assert_eq!(reg.due(task.next_run), vec![id]);
    }

    #[test]
    fn test_paused_mid_run_still_counts_as_in_flight() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        let id = reg.register(spec("t", TaskPriority::High), now).unwrap();
        reg.begin_run(&id, now);
        reg.get_mut(&id).unwrap().status = TaskStatus::Paused;
        assert_eq!(reg.count_status(TaskStatus::Running), 0);
        assert_eq!(reg.in_flight_count(), 1);

        let entry = HistoryEntry::completed(now, Duration::ZERO, serde_json::Value::Null);
        reg.finish_run(&id, now, entry, true);
        assert_eq!(reg.in_flight_count(), 0);
        assert_eq!(reg.get(&id).unwrap().status, TaskStatus::Paused);
    }

    #[test]
    fn test_one_shot_terminal_states() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        let ok = reg.register(spec("ok", TaskPriority::High).once(), now).unwrap();
        let bad = reg.register(spec("bad", TaskPriority::High).once(), now).unwrap();
        reg.begin_run(&ok, now);
        reg.begin_run(&bad, now);
        reg.finish_run(&ok, now, HistoryEntry::completed(now, Duration::ZERO, 1.into()), true);
        reg.finish_run(&bad, now, HistoryEntry::failed(now, Duration::ZERO, "x".into()), false);
        assert_eq!(reg.get(&ok).unwrap().status, TaskStatus::Completed);
        assert_eq!(reg.get(&bad).unwrap().status, TaskStatus::Failed);
        assert!(reg.due(now + chrono::Duration::days(1)).is_empty());
    }

    #[test]
    fn test_by_agent() {
        let mut reg = TaskRegistry::new(10);
        let now = now_millis();
        reg.register(spec("a1", TaskPriority::Low).agent("alpha"), now).unwrap();
        reg.register(spec("b1", TaskPriority::Low).agent("beta"), now).unwrap();
        reg.register(spec("a2", TaskPriority::Low).agent("alpha"), now).unwrap();
        let names: Vec<_> = reg.infos_by_agent("alpha").into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a1", "a2"]);
        assert!(reg.infos_by_agent("gamma").is_empty());
    }
}
