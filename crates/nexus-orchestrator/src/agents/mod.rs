//! The six built-in agent variants.

/// Timestamped, checksum-verified copies.
pub mod backup;
/// Temporary and empty file cleanup.
pub mod cleanup;
/// Filesystem watchers.
pub mod monitor;
/// Extension-based file organization.
pub mod organizer;
/// Tree integrity scan.
pub mod repair;
/// File name search.
pub mod search;

pub use backup::BackupAgent;
pub use cleanup::CleanupAgent;
pub use monitor::MonitorAgent;
pub use organizer::OrganizerAgent;
pub use repair::RepairAgent;
pub use search::SearchAgent;

use crate::agent::Agent;
use crate::fs_walk::WalkOptions;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor};
use nexus_core::{AiProvider, NexusError, NexusResult};
use std::sync::Arc;

/// Build the canonical agent for `kind`.
///
/// `provider` is only used by the organizer's `suggest` action.
pub fn default_agent(
    kind: AgentKind,
    history_capacity: usize,
    provider: Option<Arc<dyn AiProvider>>,
) -> Arc<dyn Agent> {
    let config = AgentConfig::default_for(kind);
    match kind {
        AgentKind::Monitor => {
            Arc::new(MonitorAgent::new(config).with_history_capacity(history_capacity))
        }
        AgentKind::Repair => {
            Arc::new(RepairAgent::new(config).with_history_capacity(history_capacity))
        }
        AgentKind::Organizer => {
            let agent = OrganizerAgent::new(config).with_history_capacity(history_capacity);
            match provider {
                Some(provider) => Arc::new(agent.with_provider(provider)),
                None => Arc::new(agent),
            }
        }
        AgentKind::Cleanup => {
            Arc::new(CleanupAgent::new(config).with_history_capacity(history_capacity))
        }
        AgentKind::Search => {
            Arc::new(SearchAgent::new(config).with_history_capacity(history_capacity))
        }
        AgentKind::Backup => {
            Arc::new(BackupAgent::new(config).with_history_capacity(history_capacity))
        }
    }
}

/// Optional non-negative integer parameter.
pub(crate) fn param_usize(task: &TaskDescriptor, key: &str, default: usize) -> NexusResult<usize> {
    match task.param(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                NexusError::Validation(format!(
                    "parameter '{key}' must be a non-negative integer"
                ))
            }),
    }
}

/// Walk options from the optional `max_depth` parameter.
pub(crate) fn walk_options(task: &TaskDescriptor) -> NexusResult<WalkOptions> {
    let max_depth = match task.param("max_depth") {
        None | Some(serde_json::Value::Null) => None,
        Some(_) => Some(param_usize(task, "max_depth", 0)?),
    };
    Ok(WalkOptions { max_depth })
}
