//! Task runner — executes one dispatched handler invocation.
//!
//! The handler runs in its own tokio task so a panic is reported as a failed
//! run instead of leaving the task stuck in RUNNING.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::handler::{TaskContext, TaskHandler};
use crate::output::TaskOutput;

/// A task that has been marked RUNNING and is ready to execute.
pub(crate) struct Dispatch {
    pub handler: Arc<dyn TaskHandler>,
    pub context: TaskContext,
    pub dispatched_at: DateTime<Utc>,
}

pub(crate) struct RunOutcome {
    /// Monotonic time between dispatch and handler resolution.
    pub duration: Duration,
    pub result: Result<TaskOutput, String>,
}

pub(crate) async fn execute(dispatch: &Dispatch) -> RunOutcome {
    let handler = dispatch.handler.clone();
    let ctx = dispatch.context.clone();
    let started = Instant::now();
    let joined = tokio::spawn(async move { handler.run(ctx).await }).await;
    let duration = started.elapsed();

    let result = match joined {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) if e.is_panic() => Err(format!(
            "handler panicked: {}",
            panic_message(e.into_panic())
        )),
        Err(e) => Err(format!("handler aborted: {e}")),
    };
    RunOutcome { duration, result }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::tasks::{StateBag, TaskId, now_millis};
    use serde_json::json;

    fn dispatch(handler: impl TaskHandler + 'static) -> Dispatch {
        Dispatch {
            handler: Arc::new(handler),
            context: TaskContext {
                id: TaskId::new(),
                name: "sampler".into(),
                agent_id: None,
                run_count: 1,
                state: StateBag::default(),
            },
            dispatched_at: now_millis(),
        }
    }

    #[tokio::test]
    async fn test_success_measures_duration() {
        let d = dispatch(handler_fn(|_ctx| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(TaskOutput::from(json!({"ok": true})))
        }));
        let outcome = execute(&d).await;
        assert!(outcome.duration >= Duration::from_millis(10));
        assert_eq!(outcome.result.unwrap().value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_error_message() {
        let d = dispatch(handler_fn(|_ctx| async { Err(anyhow::anyhow!("boom")) }));
        assert_eq!(execute(&d).await.result.unwrap_err(), "boom");
    }

    #[tokio::test]
    async fn test_panic_is_failure() {
        let d = dispatch(handler_fn(|_ctx| async {
            if true {
                panic!("kaboom");
            }
            Ok(TaskOutput::empty())
        }));
        let err = execute(&d).await.result.unwrap_err();
        assert!(err.contains("kaboom"), "{err}");
    }

    #[tokio::test]
    async fn test_handler_writes_state() {
        let d = dispatch(handler_fn(|ctx: TaskContext| async move {
            ctx.state.set("seen", json!(ctx.run_count));
            Ok(TaskOutput::empty())
        }));
        execute(&d).await.result.unwrap();
        assert_eq!(d.context.state.get("seen"), Some(json!(1)));
    }
}
