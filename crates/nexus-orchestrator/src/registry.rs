use crate::engine::Orchestrator;
use crate::types::{AgentKind, Parameters, TaskDescriptor, TaskOutput, TaskStatus};
use nexus_core::{NexusError, NexusResult};
use std::sync::OnceLock;
use tracing::info;

static GLOBAL: OnceLock<Orchestrator> = OnceLock::new();

/// Process-wide orchestrator with every built-in agent registered.
///
/// Built with the default configuration on first access and never torn
/// down. Prefer passing an [`Orchestrator`] explicitly where one is at hand.
pub fn global() -> &'static Orchestrator {
    GLOBAL.get_or_init(|| {
        let orchestrator = Orchestrator::default();
        orchestrator.register_all_agents();
        info!("Global orchestrator initialized");
        orchestrator
    })
}

/// Run one task on the global orchestrator and return its result map.
pub async fn quick_task(
    kind: AgentKind,
    parameters: Parameters,
    description: &str,
) -> NexusResult<TaskOutput> {
    quick_task_with(global(), kind, parameters, description).await
}

/// Run one task inline on `orchestrator` and return its result map.
///
/// A task that ends failed or cancelled is returned as
/// [`NexusError::TaskFailed`] carrying the task's error message.
pub async fn quick_task_with(
    orchestrator: &Orchestrator,
    kind: AgentKind,
    parameters: Parameters,
    description: &str,
) -> NexusResult<TaskOutput> {
    let task = TaskDescriptor::new(kind)
        .with_description(description)
        .with_parameters(parameters);
    let done = orchestrator.execute_task(task).await;

    match (done.status(), done.result()) {
        (TaskStatus::Completed, Some(result)) => Ok(result.clone()),
        (status, _) => Err(NexusError::TaskFailed(
            done.error()
                .map(str::to_string)
                .unwrap_or_else(|| format!("task {} ended {status}", done.id())),
        )),
    }
}
