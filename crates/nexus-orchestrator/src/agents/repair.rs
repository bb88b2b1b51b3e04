use crate::agent::{into_output, require_str, Agent, DEFAULT_AGENT_HISTORY_CAPACITY};
use crate::agents::walk_options;
use crate::fs_walk::{self, WalkErrorKind};
use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput};
use async_trait::async_trait;
use nexus_core::NexusResult;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Issues beyond this count are tallied but not listed.
const MAX_REPORTED_ISSUES: usize = 500;

const PROBE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnreadableFile,
    UnreadableDirectory,
    BrokenSymlink,
    MetadataError,
    EmptyFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub detail: String,
}

/// Scans a tree for entries that cannot be read or look damaged.
///
/// Every file is opened and its first block read back. Inaccessible entries
/// are reported as issues and never fail the task.
pub struct RepairAgent {
    config: AgentConfig,
    history: ExecutionHistory,
}

impl RepairAgent {
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

impl Default for RepairAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default_for(AgentKind::Repair))
    }
}

async fn probe_file(path: &Path) -> Result<(), String> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| e.to_string())?;
    let mut buf = [0u8; PROBE_BYTES];
    file.read(&mut buf)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[async_trait]
impl Agent for RepairAgent {
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
        let report = fs_walk::walk(Path::new(root), &walk_options(task)?).await?;

        let mut issues: Vec<Issue> = report
            .errors
            .iter()
            .map(|e| Issue {
                path: e.path.clone(),
                kind: match e.kind {
                    WalkErrorKind::UnreadableDirectory => IssueKind::UnreadableDirectory,
                    WalkErrorKind::BrokenSymlink => IssueKind::BrokenSymlink,
                    WalkErrorKind::Metadata => IssueKind::MetadataError,
                },
                detail: e.message.clone(),
            })
            .collect();

        let mut files_scanned = 0usize;
        for entry in report.files() {
            files_scanned += 1;
            if let Err(detail) = probe_file(&entry.path).await {
                issues.push(Issue {
                    path: entry.path.clone(),
                    kind: IssueKind::UnreadableFile,
                    detail,
                });
            } else if entry.size == 0 {
                issues.push(Issue {
                    path: entry.path.clone(),
                    kind: IssueKind::EmptyFile,
                    detail: "file is empty".to_string(),
                });
            }
        }
        let directories_scanned = report.directories().count();
        let issues_found = issues.len();
        debug!(path = root, files_scanned, issues_found, "Repair scan finished");

        issues.truncate(MAX_REPORTED_ISSUES);
        Ok(into_output(json!({
            "path": root,
            "files_scanned": files_scanned,
            "directories_scanned": directories_scanned,
            "issues_found": issues_found,
            "issues": issues,
        })))
    }
}
