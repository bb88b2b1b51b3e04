use crate::agent::{into_output, require_str, Agent, DEFAULT_AGENT_HISTORY_CAPACITY};
use crate::agents::{param_usize, walk_options};
use crate::fs_walk;
use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput};
use async_trait::async_trait;
use nexus_core::NexusResult;
use serde_json::json;
use std::path::Path;

const DEFAULT_MAX_RESULTS: usize = 100;

/// Case-insensitive file name search under `path`.
///
/// `query` must be a substring of the file name. `extension` (with or
/// without the leading dot) narrows the match; `max_results` caps the list,
/// while `total_matches` always reports the full count.
pub struct SearchAgent {
    config: AgentConfig,
    history: ExecutionHistory,
}

impl SearchAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            history: ExecutionHistory::new(DEFAULT_AGENT_HISTORY_CAPACITY),
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ExecutionHistory::new(capacity);
        self
    }
}

impl Default for SearchAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default_for(AgentKind::Search))
    }
}

#[async_trait]
impl Agent for SearchAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    fn validate(&self, task: &TaskDescriptor) -> NexusResult<()> {
        require_str(task, "path")?;
        require_str(task, "query")?;
        param_usize(task, "max_results", DEFAULT_MAX_RESULTS)?;
        walk_options(task).map(|_| ())
    }

    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput> {
        let root = require_str(task, "path")?;
        let query = require_str(task, "query")?.to_lowercase();
        let extension = task
            .param_str("extension")
            .map(|ext| ext.trim_start_matches('.').to_lowercase());
        let max_results = param_usize(task, "max_results", DEFAULT_MAX_RESULTS)?;

        let report = fs_walk::walk(Path::new(root), &walk_options(task)?).await?;
        let mut total_matches = 0usize;
        let mut matches = Vec::new();
        for entry in report.files() {
            if !entry.file_name().to_lowercase().contains(&query) {
                continue;
            }
            if let Some(wanted) = &extension {
                if entry.extension().as_deref() != Some(wanted.as_str()) {
                    continue;
                }
            }
            total_matches += 1;
            if matches.len() < max_results {
                matches.push(json!({
                    "path": entry.path,
                    "name": entry.file_name(),
                    "size": entry.size,
                }));
            }
        }

        Ok(into_output(json!({
            "path": root,
            "query": query,
            "matches": matches,
            "total_matches": total_matches,
            "truncated": total_matches > matches.len(),
        })))
    }
}
