use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput, TaskStatus};
use async_trait::async_trait;
use futures_util::FutureExt;
use nexus_core::{NexusError, NexusResult};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default number of finished tasks each agent keeps for introspection.
pub const DEFAULT_AGENT_HISTORY_CAPACITY: usize = 100;

/// Summary stored on a task when its agent panicked.
pub const UNEXPECTED_FAULT: &str = "Unexpected agent fault";

/// Trait that every agent variant implements.
///
/// An agent is created once at registration and shared across all workers
/// dispatching to its kind, so any mutable state it holds must be
/// synchronized by the agent itself.
#[async_trait]
pub trait Agent: Send + Sync {
    fn config(&self) -> &AgentConfig;

    /// Bounded local log of tasks this agent has finished.
    fn history(&self) -> &ExecutionHistory;

    fn kind(&self) -> AgentKind {
        self.config().kind
    }

    /// Reject malformed parameters before the agent body runs.
    fn validate(&self, _task: &TaskDescriptor) -> NexusResult<()> {
        Ok(())
    }

    /// Variant-specific work. May suspend on I/O.
    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput>;
}

/// Run a task through an agent and return the finished descriptor.
///
/// This is the fault boundary around every agent: validation errors, domain
/// errors, deadline expiry and panics all end as a `Failed` task with a
/// truncated message. It never returns an error and never unwinds. An `Idle`
/// task is moved to `Running` first; a task in any other non-running state is
/// returned untouched.
pub async fn run_task(
    agent: &dyn Agent,
    mut task: TaskDescriptor,
    deadline: Option<Duration>,
) -> TaskDescriptor {
    let config = agent.config();

    if task.status() == TaskStatus::Idle {
        if let Err(e) = task.mark_running() {
            warn!(task_id = %task.id(), error = %e, "Task could not be started");
            return task;
        }
    }
    if task.status() != TaskStatus::Running {
        warn!(
            task_id = %task.id(),
            status = %task.status(),
            agent = %config.name,
            "Task is not runnable, skipping"
        );
        return task;
    }

    info!(
        task_id = %task.id(),
        agent = %config.name,
        kind = %config.kind,
        "Task started"
    );
    let start = Instant::now();

    let outcome = execute_guarded(agent, &task, deadline).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let settled = match outcome {
        Ok(output) => task.complete(output).map(|()| {
            info!(task_id = %task.id(), agent = %config.name, duration_ms, "Task completed");
        }),
        Err(message) => task.fail(&message).map(|()| {
            warn!(
                task_id = %task.id(),
                agent = %config.name,
                duration_ms,
                error = %message,
                "Task failed"
            );
        }),
    };
    if let Err(e) = settled {
        error!(task_id = %task.id(), error = %e, "Could not record task outcome");
    }

    agent.history().record(task.clone());
    task
}

async fn execute_guarded(
    agent: &dyn Agent,
    task: &TaskDescriptor,
    deadline: Option<Duration>,
) -> Result<TaskOutput, String> {
    agent.validate(task).map_err(|e| e.to_string())?;

    let body = AssertUnwindSafe(agent.execute(task)).catch_unwind();
    let caught = match deadline {
        Some(limit) => match tokio::time::timeout(limit, body).await {
            Ok(caught) => caught,
            Err(_) => return Err(NexusError::Timeout(limit.as_millis() as u64).to_string()),
        },
        None => body.await,
    };

    match caught {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => {
            error!(
                task_id = %task.id(),
                agent = %agent.config().name,
                panic = %panic_message(payload.as_ref()),
                "Agent panicked while executing task"
            );
            Err(UNEXPECTED_FAULT.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Required string parameter, or a validation error naming it.
pub fn require_str<'a>(task: &'a TaskDescriptor, key: &str) -> NexusResult<&'a str> {
    match task.param_str(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(NexusError::Validation(format!("parameter '{key}' is empty"))),
        None => Err(NexusError::Validation(format!(
            "missing required string parameter '{key}'"
        ))),
    }
}

/// Convert a `json!` object into a task output map.
pub fn into_output(value: serde_json::Value) -> TaskOutput {
    match value {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = TaskOutput::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
