use crate::agent::{into_output, require_str, Agent, DEFAULT_AGENT_HISTORY_CAPACITY};
use crate::fs_walk::{self, WalkEntry, WalkOptions};
use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput};
use async_trait::async_trait;
use nexus_core::{AiMessage, AiProvider, ChatOptions, NexusError, NexusResult};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Extension table used to group files. Anything unlisted is `other`.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("model", &["gguf", "safetensors", "pt", "onnx", "ckpt"]),
    ("video", &["mp4", "mkv", "avi", "mov", "wmv", "webm"]),
    ("image", &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "tiff", "heic"]),
    ("audio", &["mp3", "wav", "flac", "m4a", "aac", "ogg"]),
    ("document", &["pdf", "doc", "docx", "txt", "md", "odt", "rtf", "xls", "xlsx", "ppt", "pptx"]),
    ("archive", &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"]),
    ("code", &["py", "js", "ts", "rs", "go", "java", "cs", "c", "cpp", "h", "rb", "sh"]),
    ("data", &["json", "xml", "csv", "yaml", "yml", "toml", "sql"]),
    ("temp", &["tmp", "temp", "bak", "log", "cache"]),
];

const OTHER: &str = "other";

/// Names listed per category in an AI prompt.
const PROMPT_SAMPLES: usize = 5;

const SUGGEST_SYSTEM_PROMPT: &str = "You are a file organization assistant. \
Given a summary of a directory, propose a clear folder structure and naming \
conventions. Answer with a short, actionable list.";

/// Category for a lowercased extension.
pub fn categorize(extension: Option<&str>) -> &'static str {
    let Some(ext) = extension else {
        return OTHER;
    };
    CATEGORIES
        .iter()
        .find(|(_, exts)| exts.contains(&ext))
        .map(|(name, _)| *name)
        .unwrap_or(OTHER)
}

#[derive(Debug, Clone, Serialize)]
struct PlannedMove {
    from: PathBuf,
    to: PathBuf,
    category: &'static str,
}

/// Groups the direct children of a directory by file category.
///
/// Actions (`parameters["action"]`, default `plan`):
/// - `plan`: report the category of every file and the moves `apply` would make.
/// - `apply`: move files into `<path>/<category>/`; honors `dry_run`.
/// - `suggest`: ask the AI provider for organization advice.
pub struct OrganizerAgent {
    config: AgentConfig,
    history: ExecutionHistory,
    provider: Option<Arc<dyn AiProvider>>,
}

impl OrganizerAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            history: ExecutionHistory::new(DEFAULT_AGENT_HISTORY_CAPACITY),
            provider: None,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ExecutionHistory::new(capacity);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    async fn top_level_files(root: &Path) -> NexusResult<Vec<WalkEntry>> {
        let report = fs_walk::walk(root, &WalkOptions { max_depth: Some(1) }).await?;
        if report.entries.len() == 1 && report.entries[0].path == report.root {
            return Err(NexusError::Validation(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }
        Ok(report.files().cloned().collect())
    }

    fn plan_moves(root: &Path, files: &[WalkEntry]) -> Vec<PlannedMove> {
        files
            .iter()
            .map(|entry| {
                let category = categorize(entry.extension().as_deref());
                PlannedMove {
                    from: entry.path.clone(),
                    to: root.join(category).join(entry.file_name()),
                    category,
                }
            })
            .collect()
    }

    fn group(moves: &[PlannedMove]) -> BTreeMap<&'static str, Vec<String>> {
        let mut categories: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for planned in moves {
            let name = planned
                .from
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            categories.entry(planned.category).or_default().push(name);
        }
        categories
    }

    async fn plan(&self, root: &Path) -> NexusResult<TaskOutput> {
        let files = Self::top_level_files(root).await?;
        let moves = Self::plan_moves(root, &files);
        Ok(into_output(json!({
            "path": root.display().to_string(),
            "file_count": files.len(),
            "categories": Self::group(&moves),
            "moves": moves,
        })))
    }

    async fn apply(&self, root: &Path, dry_run: bool) -> NexusResult<TaskOutput> {
        let files = Self::top_level_files(root).await?;
        let moves = Self::plan_moves(root, &files);

        let mut moved = Vec::new();
        let mut skipped = Vec::new();
        if !dry_run {
            for planned in &moves {
                if let Some(parent) = planned.to.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        warn!(dir = %parent.display(), error = %e, "Category directory unavailable");
                        skipped.push(json!({"path": planned.from, "reason": e.to_string()}));
                        continue;
                    }
                }
                if tokio::fs::try_exists(&planned.to).await.unwrap_or(true) {
                    skipped.push(json!({
                        "path": planned.from,
                        "reason": "target already exists",
                    }));
                    continue;
                }
                match tokio::fs::rename(&planned.from, &planned.to).await {
                    Ok(()) => moved.push(planned.clone()),
                    Err(e) => {
                        warn!(path = %planned.from.display(), error = %e, "Move failed");
                        skipped.push(json!({"path": planned.from, "reason": e.to_string()}));
                    }
                }
            }
            info!(path = %root.display(), moved = moved.len(), "Directory organized");
        }

        Ok(into_output(json!({
            "path": root.display().to_string(),
            "dry_run": dry_run,
            "planned": moves,
            "moved": moved.len(),
            "skipped": skipped,
        })))
    }

    async fn suggest(&self, root: &Path) -> NexusResult<TaskOutput> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            NexusError::Provider("no AI provider configured for the organizer".into())
        })?;

        let files = Self::top_level_files(root).await?;
        let moves = Self::plan_moves(root, &files);
        let mut summary = format!(
            "Directory: {}\nFiles: {}\n",
            root.display(),
            files.len()
        );
        for (category, names) in Self::group(&moves) {
            let sample: Vec<&str> = names.iter().take(PROMPT_SAMPLES).map(String::as_str).collect();
            summary.push_str(&format!(
                "- {category}: {} file(s), e.g. {}\n",
                names.len(),
                sample.join(", ")
            ));
        }

        let messages = vec![
            AiMessage::system(SUGGEST_SYSTEM_PROMPT),
            AiMessage::user(summary),
        ];
        let response = provider.chat(&messages, &ChatOptions::default()).await?;

        Ok(into_output(json!({
            "path": root.display().to_string(),
            "file_count": files.len(),
            "suggestion": response.content,
            "model": response.model,
            "provider": response.provider,
        })))
    }
}

impl Default for OrganizerAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default_for(AgentKind::Organizer))
    }
}

#[async_trait]
impl Agent for OrganizerAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    fn validate(&self, task: &TaskDescriptor) -> NexusResult<()> {
        require_str(task, "path").map(|_| ())
    }

    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput> {
        let root = Path::new(require_str(task, "path")?);
        match task.param_str("action").unwrap_or("plan") {
            "plan" => self.plan(root).await,
            "apply" => self.apply(root, task.param_bool("dry_run", false)).await,
            "suggest" => self.suggest(root).await,
            other => Err(NexusError::UnsupportedAction(format!(
                "organizer agent does not support '{other}'"
            ))),
        }
    }
}
