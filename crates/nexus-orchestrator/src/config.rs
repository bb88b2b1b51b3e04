use crate::agent::DEFAULT_AGENT_HISTORY_CAPACITY;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use nexus_core::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the orchestrator does with a task whose kind has no registered agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisteredAgentPolicy {
    /// Fail the task with `Agent not found: <kind>`.
    #[default]
    FailFast,
    /// Register the canonical agent for the kind, then dispatch to it.
    RegisterDefault,
}

/// Orchestrator settings. Every field has a default, so an empty table is
/// a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_agent_history_capacity")]
    pub agent_history_capacity: usize,
    /// `None` leaves the queue unbounded.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Per-task execution deadline. `None` disables it.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    #[serde(default)]
    pub unregistered_agent: UnregisteredAgentPolicy,
}

fn default_workers() -> usize {
    4
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_agent_history_capacity() -> usize {
    DEFAULT_AGENT_HISTORY_CAPACITY
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            history_capacity: default_history_capacity(),
            agent_history_capacity: default_agent_history_capacity(),
            queue_capacity: None,
            task_timeout_secs: None,
            unregistered_agent: UnregisteredAgentPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(s: &str) -> NexusResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| NexusError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NexusResult<()> {
        if self.workers == 0 {
            return Err(NexusError::Config("workers must be at least 1".into()));
        }
        if self.queue_capacity == Some(0) {
            return Err(NexusError::Config(
                "queue_capacity must be at least 1 when set".into(),
            ));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(NexusError::Config(
                "task_timeout_secs must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_policy(mut self, policy: UnregisteredAgentPolicy) -> Self {
        self.unregistered_agent = policy;
        self
    }
}
