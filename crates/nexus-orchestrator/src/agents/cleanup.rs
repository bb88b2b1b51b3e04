use crate::agent::{into_output, require_str, Agent, DEFAULT_AGENT_HISTORY_CAPACITY};
use crate::agents::walk_options;
use crate::fs_walk::{self, WalkEntry, WalkReport};
use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput};
use async_trait::async_trait;
use nexus_core::NexusResult;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const TEMP_EXTENSIONS: &[&str] = &["tmp", "temp", "bak", "old"];
const TEMP_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupReason {
    TemporaryFile,
    EmptyFile,
    EmptyDirectory,
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub path: PathBuf,
    pub reason: CleanupReason,
    pub size: u64,
}

/// True for editor backups, OS metadata droppings and temp extensions.
pub fn is_temporary(entry: &WalkEntry) -> bool {
    let name = entry.file_name();
    if name.ends_with('~') || TEMP_FILE_NAMES.contains(&name.as_str()) {
        return true;
    }
    entry
        .extension()
        .is_some_and(|ext| TEMP_EXTENSIONS.contains(&ext.as_str()))
}

/// Collect cleanup candidates from a walk. Directories that hold nothing
/// (and were readable) are candidates; a directory whose only contents are
/// themselves candidates is not.
fn find_candidates(report: &WalkReport) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in report.files() {
        let reason = if is_temporary(entry) {
            CleanupReason::TemporaryFile
        } else if entry.size == 0 {
            CleanupReason::EmptyFile
        } else {
            continue;
        };
        candidates.push(Candidate {
            path: entry.path.clone(),
            reason,
            size: entry.size,
        });
    }

    let mut occupied: HashSet<&Path> = report
        .entries
        .iter()
        .filter_map(|e| e.path.parent())
        .collect();
    // Failed entries still occupy their parent, and an unreadable directory
    // is not known to be empty.
    for error in &report.errors {
        occupied.insert(error.path.as_path());
        if let Some(parent) = error.path.parent() {
            occupied.insert(parent);
        }
    }

    for dir in report.directories() {
        if occupied.contains(dir.path.as_path()) {
            continue;
        }
        if report.max_depth.is_some_and(|max| dir.depth >= max) {
            continue;
        }
        candidates.push(Candidate {
            path: dir.path.clone(),
            reason: CleanupReason::EmptyDirectory,
            size: 0,
        });
    }

    candidates
}

/// Finds temporary files, empty files and empty directories, and removes
/// them unless `dry_run` (default `true`) is set.
pub struct CleanupAgent {
    config: AgentConfig,
    history: ExecutionHistory,
}

impl CleanupAgent {
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

impl Default for CleanupAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default_for(AgentKind::Cleanup))
    }
}

#[async_trait]
impl Agent for CleanupAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    fn validate(&self, task: &TaskDescriptor) -> NexusResult<()> {
        require_str(task, "path")?;
        walk_options(task).map(|_| ())
    }

    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput> {
        let root = require_str(task, "path")?;
        let dry_run = task.param_bool("dry_run", true);
        let report = fs_walk::walk(Path::new(root), &walk_options(task)?).await?;
        let candidates = find_candidates(&report);
        let reclaimable_bytes: u64 = candidates.iter().map(|c| c.size).sum();

        let mut removed = 0usize;
        let mut errors = Vec::new();
        if !dry_run {
            for candidate in &candidates {
                let outcome = match candidate.reason {
                    CleanupReason::EmptyDirectory => tokio::fs::remove_dir(&candidate.path).await,
                    _ => tokio::fs::remove_file(&candidate.path).await,
                };
                match outcome {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        warn!(path = %candidate.path.display(), error = %e, "Cleanup removal failed");
                        errors.push(json!({"path": candidate.path, "error": e.to_string()}));
                    }
                }
            }
            info!(path = root, removed, reclaimable_bytes, "Cleanup finished");
        }

        Ok(into_output(json!({
            "path": root,
            "dry_run": dry_run,
            "candidate_count": candidates.len(),
            "reclaimable_bytes": reclaimable_bytes,
            "candidates": candidates,
            "removed": removed,
            "errors": errors,
        })))
    }
}
