//! Task orchestration for the NexusFS filesystem agents.
//!
//! Tasks are typed descriptors addressed to one [`AgentKind`]. They are either
//! queued and picked up by a pool of Tokio workers in priority order, or
//! executed inline. Every task ends in exactly one terminal status and is
//! recorded in a bounded history.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Owns the queue, the worker pool and the agent registry.
//! - [`TaskQueue`]: Priority queue (priority, then submission order).
//! - [`TaskDescriptor`] / [`TaskHandle`]: A unit of work and a shared view of it.
//! - [`Agent`]: Capability trait implemented by the six built-in agents.
//! - [`AgentMonitor`]: Per-kind activity and outcome counters.
//! - [`global`] / [`quick_task`]: Process-wide orchestrator and one-shot helper.

/// Agent capability trait and the shared fault boundary.
pub mod agent;
/// Built-in agent variants.
pub mod agents;
/// Orchestrator configuration.
pub mod config;
/// Orchestrator engine and worker pool.
pub mod engine;
/// Async directory walker used by the filesystem agents.
pub mod fs_walk;
/// Bounded log of finished tasks.
pub mod history;
/// Per-kind agent metrics.
pub mod monitor;
/// Global orchestrator accessor and `quick_task`.
pub mod registry;
/// Priority task queue.
pub mod task_queue;
/// Task, priority, status and agent types.
pub mod types;

pub use agent::{run_task, Agent};
pub use agents::default_agent;
pub use config::{OrchestratorConfig, UnregisteredAgentPolicy};
pub use engine::{Orchestrator, OrchestratorStatus};
pub use history::ExecutionHistory;
pub use monitor::{AgentMetrics, AgentMonitor, AgentState, WorkerStatus};
pub use registry::{global, quick_task, quick_task_with};
pub use task_queue::TaskQueue;
pub use types::{
    AgentConfig, AgentKind, Parameters, TaskDescriptor, TaskHandle, TaskOutput, TaskPriority,
    TaskStatus,
};
