use crate::agent::{into_output, require_str, Agent, DEFAULT_AGENT_HISTORY_CAPACITY};
use crate::fs_walk::{self, EntryKind, WalkOptions, WalkReport};
use crate::history::ExecutionHistory;
use crate::types::{AgentConfig, AgentKind, TaskDescriptor, TaskOutput};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File written at the top of every backup directory.
pub const MANIFEST_FILE: &str = "manifest.json";

const HASH_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the backup root.
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub source: PathBuf,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
    /// Symlinks are recorded here and not copied.
    pub skipped: Vec<PathBuf>,
}

/// Hex-encoded SHA-256 of a file's contents.
pub async fn sha256_file(path: &Path) -> NexusResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_BYTES];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Copies `source` into `destination/<source-name>-<UTC timestamp>-<task id>/`,
/// verifying every copied file by checksum and writing a manifest.
///
/// Backups run one at a time per agent.
pub struct BackupAgent {
    config: AgentConfig,
    history: ExecutionHistory,
    in_progress: Mutex<()>,
}

impl BackupAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            history: ExecutionHistory::new(DEFAULT_AGENT_HISTORY_CAPACITY),
            in_progress: Mutex::new(()),
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ExecutionHistory::new(capacity);
        self
    }

    async fn check_destination(source: &Path, destination: &Path) -> NexusResult<()> {
        tokio::fs::create_dir_all(destination).await?;
        let source = tokio::fs::canonicalize(source).await?;
        let destination = tokio::fs::canonicalize(destination).await?;
        if destination.starts_with(&source) {
            return Err(NexusError::Validation(format!(
                "destination '{}' is inside the source tree",
                destination.display()
            )));
        }
        Ok(())
    }

    fn relative_path(report: &WalkReport, path: &Path) -> NexusResult<PathBuf> {
        if path == report.root {
            return Ok(path.file_name().map(PathBuf::from).unwrap_or_default());
        }
        path.strip_prefix(&report.root)
            .map(Path::to_path_buf)
            .map_err(|e| NexusError::Agent(format!("unexpected path '{}': {e}", path.display())))
    }

    /// Create `backup_path`, copy the walked tree into it and write the
    /// manifest. On failure the partial backup directory is removed.
    async fn write_backup(
        report: &WalkReport,
        source: &Path,
        backup_path: &Path,
        task_id: &str,
        created_at: DateTime<Utc>,
    ) -> NexusResult<(BackupManifest, u64)> {
        tokio::fs::create_dir(backup_path).await?;
        match Self::populate(report, source, backup_path, task_id, created_at).await {
            Ok(done) => Ok(done),
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(backup_path).await {
                    warn!(
                        backup = %backup_path.display(),
                        error = %cleanup,
                        "Could not remove partial backup"
                    );
                }
                Err(e)
            }
        }
    }

    async fn populate(
        report: &WalkReport,
        source: &Path,
        backup_path: &Path,
        task_id: &str,
        created_at: DateTime<Utc>,
    ) -> NexusResult<(BackupManifest, u64)> {
        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let mut bytes_copied = 0u64;
        for entry in &report.entries {
            let relative = Self::relative_path(report, &entry.path)?;
            let target = backup_path.join(&relative);
            match entry.kind {
                EntryKind::Directory => tokio::fs::create_dir_all(&target).await?,
                EntryKind::Symlink => skipped.push(relative),
                EntryKind::File => {
                    let (size, sha256) = Self::copy_verified(&entry.path, &target).await?;
                    debug!(file = %relative.display(), size, "Backed up file");
                    bytes_copied += size;
                    files.push(ManifestEntry {
                        path: relative,
                        size,
                        sha256,
                    });
                }
            }
        }

        let manifest = BackupManifest {
            source: source.to_path_buf(),
            task_id: task_id.to_string(),
            created_at,
            files,
            skipped,
        };
        tokio::fs::write(
            backup_path.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;
        Ok((manifest, bytes_copied))
    }

    async fn copy_verified(from: &Path, to: &Path) -> NexusResult<(u64, String)> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(from, to).await.map_err(|e| {
            NexusError::Agent(format!("failed to copy '{}': {e}", from.display()))
        })?;
        let expected = sha256_file(from).await?;
        let actual = sha256_file(to).await?;
        if expected != actual {
            return Err(NexusError::Agent(format!(
                "checksum mismatch for '{}'",
                from.display()
            )));
        }
        Ok((bytes, actual))
    }
}

impl Default for BackupAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default_for(AgentKind::Backup))
    }
}

#[async_trait]
impl Agent for BackupAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    fn validate(&self, task: &TaskDescriptor) -> NexusResult<()> {
        require_str(task, "source")?;
        require_str(task, "destination").map(|_| ())
    }

    async fn execute(&self, task: &TaskDescriptor) -> NexusResult<TaskOutput> {
        let _single_flight = self.in_progress.lock().await;

        let source = PathBuf::from(require_str(task, "source")?);
        let destination = PathBuf::from(require_str(task, "destination")?);

        let report = fs_walk::walk(&source, &WalkOptions::default()).await?;
        if let Some(first) = report.errors.first() {
            return Err(NexusError::Agent(format!(
                "{} source entr(ies) unreadable, first '{}': {}",
                report.errors.len(),
                first.path.display(),
                first.message
            )));
        }
        Self::check_destination(&source, &destination).await?;

        let created_at = Utc::now();
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_string());
        let backup_path = destination.join(format!(
            "{source_name}-{}-{}",
            created_at.format("%Y%m%dT%H%M%SZ"),
            task.id()
        ));
        let (manifest, bytes_copied) =
            Self::write_backup(&report, &source, &backup_path, task.id(), created_at).await?;
        let manifest_path = backup_path.join(MANIFEST_FILE);

        info!(
            source = %source.display(),
            backup = %backup_path.display(),
            files = manifest.files.len(),
            bytes_copied,
            "Backup completed"
        );

        Ok(into_output(json!({
            "source": source,
            "backup_path": backup_path,
            "manifest": manifest_path,
            "files_copied": manifest.files.len(),
            "bytes_copied": bytes_copied,
            "skipped": manifest.skipped,
            "verified": true,
        })))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::run_task;
    use crate::types::TaskStatus;
    use std::sync::Arc;

    fn source_tree(root: &Path) -> PathBuf {
        let source = root.join("projects");
        std::fs::create_dir_all(source.join("src")).unwrap();
        std::fs::write(source.join("Cargo.toml"), b"[package]").unwrap();
        std::fs::write(source.join("src/lib.rs"), b"pub fn f() {}").unwrap();
        source
    }

    fn backup(source: &Path, destination: &Path) -> TaskDescriptor {
        TaskDescriptor::new(AgentKind::Backup)
            .with_param("source", source.to_string_lossy().into_owned())
            .with_param("destination", destination.to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn test_backup_copies_and_verifies() {
        let tmp = tempfile::tempdir().unwrap();
        let source = source_tree(tmp.path());
        let destination = tmp.path().join("vault");

        let done = run_task(&BackupAgent::default(), backup(&source, &destination), None).await;
        assert_eq!(done.status(), TaskStatus::Completed, "{:?}", done.error());

        let result = done.result().unwrap();
        assert_eq!(result["files_copied"], 2);
        assert_eq!(result["bytes_copied"], 22);
        assert_eq!(result["verified"], true);

        let backup_path = PathBuf::from(result["backup_path"].as_str().unwrap());
        assert!(backup_path.starts_with(&destination));
        assert!(backup_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("projects-"));
        assert_eq!(
            std::fs::read(backup_path.join("src/lib.rs")).unwrap(),
            b"pub fn f() {}"
        );

        let manifest: BackupManifest =
            serde_json::from_slice(&std::fs::read(backup_path.join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.task_id, done.id());
        let lib = manifest
            .files
            .iter()
            .find(|f| f.path == Path::new("src/lib.rs"))
            .unwrap();
        assert_eq!(lib.sha256, sha256_file(&source.join("src/lib.rs")).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_file_source() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("ledger.csv");
        std::fs::write(&file, b"a,b\n1,2\n").unwrap();

        let done = run_task(&BackupAgent::default(), backup(&file, &tmp.path().join("out")), None).await;
        let result = done.result().unwrap();
        assert_eq!(result["files_copied"], 1);
        let backup_path = PathBuf::from(result["backup_path"].as_str().unwrap());
        assert!(backup_path.join("ledger.csv").exists());
    }

    #[tokio::test]
    async fn test_destination_inside_source_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let source = source_tree(tmp.path());

        let done = run_task(&BackupAgent::default(), backup(&source, &source.join("backups")), None).await;
        assert_eq!(done.status(), TaskStatus::Failed);
        assert!(done.error().unwrap().contains("inside the source tree"));
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let done = run_task(
            &BackupAgent::default(),
            backup(&tmp.path().join("ghost"), &tmp.path().join("out")),
            None,
        )
        .await;
        assert_eq!(done.status(), TaskStatus::Failed);
        assert!(!tmp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_failed_copy_removes_partial_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let source = source_tree(tmp.path());
        let destination = tmp.path().join("vault");
        std::fs::create_dir_all(&destination).unwrap();

        let report = fs_walk::walk(&source, &WalkOptions::default()).await.unwrap();
        // Vanishes between the walk and the copy.
        std::fs::remove_file(source.join("src/lib.rs")).unwrap();

        let backup_path = destination.join("projects-partial");
        let err = BackupAgent::write_backup(&report, &source, &backup_path, "t1", Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to copy"), "unexpected error: {err}");
        assert!(!backup_path.exists());
        assert_eq!(std::fs::read_dir(&destination).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_backups_get_distinct_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let source = source_tree(tmp.path());
        let destination = tmp.path().join("vault");
        let agent = Arc::new(BackupAgent::default());

        let a = {
            let agent = Arc::clone(&agent);
            let task = backup(&source, &destination);
            tokio::spawn(async move { run_task(agent.as_ref(), task, None).await })
        };
        let b = {
            let agent = Arc::clone(&agent);
            let task = backup(&source, &destination);
            tokio::spawn(async move { run_task(agent.as_ref(), task, None).await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a.status(), TaskStatus::Completed);
        assert_eq!(b.status(), TaskStatus::Completed);
        assert_ne!(a.result().unwrap()["backup_path"], b.result().unwrap()["backup_path"]);
        assert_eq!(std::fs::read_dir(&destination).unwrap().count(), 2);
        assert_eq!(agent.history().len(), 2);
    }
}
