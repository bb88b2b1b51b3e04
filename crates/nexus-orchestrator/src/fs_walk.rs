//! Async directory walker shared by the filesystem agents.
//!
//! Per-entry failures are collected in the report instead of aborting the
//! walk; only an inaccessible root is an error.

use nexus_core::{NexusError, NexusResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes for files and resolvable symlinks, zero for directories.
    pub size: u64,
    /// Root is depth 0, its children depth 1.
    pub depth: usize,
}

impl WalkEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkErrorKind {
    UnreadableDirectory,
    BrokenSymlink,
    Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkError {
    pub path: PathBuf,
    pub kind: WalkErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Maximum depth to descend into; `None` walks the whole tree.
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct WalkReport {
    pub root: PathBuf,
    /// Depth limit the walk ran with. Directories at this depth were not listed.
    pub max_depth: Option<usize>,
    /// Entries sorted by path. Symlinks are reported but never followed.
    pub entries: Vec<WalkEntry>,
    pub errors: Vec<WalkError>,
}

impl WalkReport {
    pub fn files(&self) -> impl Iterator<Item = &WalkEntry> {
        self.entries.iter().filter(|e| e.is_file())
    }

    pub fn directories(&self) -> impl Iterator<Item = &WalkEntry> {
        self.entries.iter().filter(|e| e.is_dir())
    }
}

/// Walk `root`. A root that is a file yields a single entry.
pub async fn walk(root: &Path, options: &WalkOptions) -> NexusResult<WalkReport> {
    let root_meta = tokio::fs::metadata(root).await.map_err(|e| {
        NexusError::Agent(format!("cannot access '{}': {e}", root.display()))
    })?;

    let mut report = WalkReport {
        root: root.to_path_buf(),
        max_depth: options.max_depth,
        entries: Vec::new(),
        errors: Vec::new(),
    };

    if !root_meta.is_dir() {
        report.entries.push(WalkEntry {
            path: root.to_path_buf(),
            kind: EntryKind::File,
            size: root_meta.len(),
            depth: 0,
        });
        return Ok(report);
    }

    let mut pending = vec![(root.to_path_buf(), 0usize)];
    while let Some((dir, depth)) = pending.pop() {
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) => {
                report.errors.push(WalkError {
                    path: dir,
                    kind: WalkErrorKind::UnreadableDirectory,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let child_depth = depth + 1;
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    report.errors.push(WalkError {
                        path: dir.clone(),
                        kind: WalkErrorKind::UnreadableDirectory,
                        message: e.to_string(),
                    });
                    break;
                }
            };
            let path = entry.path();

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    report.errors.push(WalkError {
                        path,
                        kind: WalkErrorKind::Metadata,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if file_type.is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(target) => report.entries.push(WalkEntry {
                        path,
                        kind: EntryKind::Symlink,
                        size: target.len(),
                        depth: child_depth,
                    }),
                    Err(e) => report.errors.push(WalkError {
                        path,
                        kind: WalkErrorKind::BrokenSymlink,
                        message: e.to_string(),
                    }),
                }
                continue;
            }

            if file_type.is_dir() {
                report.entries.push(WalkEntry {
                    path: path.clone(),
                    kind: EntryKind::Directory,
                    size: 0,
                    depth: child_depth,
                });
                let descend = match options.max_depth {
                    Some(max) => child_depth < max,
                    None => true,
                };
                if descend {
                    pending.push((path, child_depth));
                }
                continue;
            }

            match entry.metadata().await {
                Ok(meta) => report.entries.push(WalkEntry {
                    path,
                    kind: EntryKind::File,
                    size: meta.len(),
                    depth: child_depth,
                }),
                Err(e) => report.errors.push(WalkError {
                    path,
                    kind: WalkErrorKind::Metadata,
                    message: e.to_string(),
                }),
            }
        }
    }

    report.entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(report)
}
