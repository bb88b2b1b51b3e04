use crate::agent::{into_output, require_str, Agent, DEFAULT_AGENT_HISTORY_CAPACITY};
use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput};
use async_trait::async_trait;
use nexus_core::{NexusError, NexusResult};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Manages recursive filesystem watchers.
///
/// Actions (`parameters["action"]`, default `status`):
/// - `status`: report active watchers and the number of events observed.
/// - `watch` (`path`): start watching a file or directory.
/// - `unwatch` (`path`): stop watching it.
///
/// Watchers are shared across all workers and guarded by a mutex.
pub struct MonitorAgent {
    config: AgentConfig,
    history: ExecutionHistory,
    watchers: Mutex<BTreeMap<PathBuf, RecommendedWatcher>>,
    events_observed: Arc<AtomicU64>,
}

impl MonitorAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            history: ExecutionHistory::new(DEFAULT_AGENT_HISTORY_CAPACITY),
            watchers: Mutex::new(BTreeMap::new()),
            events_observed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ExecutionHistory::new(capacity);
        self
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    fn status(&self) -> TaskOutput {
        let watched: Vec<String> = self
            .watchers
            .lock()
            .keys()
            .map(|p| p.display().to_string())
            .collect();
        into_output(json!({
            "watchers": watched.len(),
            "watched_paths": watched,
            "events_observed": self.events_observed.load(Ordering::Relaxed),
            "description": format!("{} active watcher(s)", watched.len()),
        }))
    }

    async fn watch(&self, raw: &str) -> NexusResult<TaskOutput> {
        let path = tokio::fs::canonicalize(raw)
            .await
            .map_err(|e| NexusError::Agent(format!("cannot watch '{raw}': {e}")))?;

        let mut watchers = self.watchers.lock();
        if watchers.contains_key(&path) {
            return Ok(into_output(json!({
                "watching": path.display().to_string(),
                "already_watching": true,
                "watchers": watchers.len(),
            })));
        }

        let counter = Arc::clone(&self.events_observed);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_ok() {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        })
        .map_err(|e| NexusError::Agent(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| NexusError::Agent(format!("failed to watch '{}': {e}", path.display())))?;

        info!(path = %path.display(), "Watcher started");
        watchers.insert(path.clone(), watcher);

        Ok(into_output(json!({
            "watching": path.display().to_string(),
            "already_watching": false,
            "watchers": watchers.len(),
        })))
    }

    async fn unwatch(&self, raw: &str) -> NexusResult<TaskOutput> {
        let path = match tokio::fs::canonicalize(raw).await {
            Ok(p) => p,
            // The directory may have been removed since it was watched.
            Err(_) => PathBuf::from(raw),
        };

        let mut watchers = self.watchers.lock();
        if watchers.remove(&path).is_none() {
            return Err(NexusError::Agent(format!(
                "not watching '{}'",
                path.display()
            )));
        }
        info!(path = %path.display(), "Watcher stopped");

        Ok(into_output(json!({
            "unwatched": path.display().to_string(),
            "watchers": watchers.len(),
        })))
    }
}

impl Default for MonitorAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default_for(AgentKind::Monitor))
    }
}

#[async_trait]
impl Agent for MonitorAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    fn validate(&self, task: &TaskDescriptor) -> NexusResult<()> {
        match task.param_str("action") {
            Some("watch") | Some("unwatch") => require_str(task, "path").map(|_| ()),
            _ => Ok(()),
        }
    }

    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput> {
        let action = match task.param("action") {
            None => "status",
            Some(value) => value.as_str().ok_or_else(|| {
                NexusError::Validation("parameter 'action' must be a string".into())
            })?,
        };

        match action {
            "status" => Ok(self.status()),
            "watch" => self.watch(require_str(task, "path")?).await,
            "unwatch" => self.unwatch(require_str(task, "path")?).await,
            other => Err(NexusError::UnsupportedAction(format!(
                "monitor agent does not support '{other}'"
            ))),
        }
    }
}
