//! Recursive directory walker producing `(name, path)` records for the loader.
//!
//! The walker is the single producer of the load pipeline: it pushes one
//! [`FileRecord`] per regular file (and per directory below the root when
//! configured) into a channel, blocking whenever the channel is full.
//! Unreadable entries are skipped and counted; they never abort the walk.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crossbeam_channel as channel;
use serde::Serialize;

use crate::core::config::WalkerSettings;
use crate::core::errors::{FidxError, Result};
use crate::core::paths::resolve_absolute_path;

/// Walker configuration derived from `WalkerSettings`.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub root: PathBuf,
    pub max_depth: usize,
    pub follow_symlinks: bool,
    pub include_directories: bool,
    pub excluded_paths: HashSet<PathBuf>,
}

impl WalkerConfig {
    /// Defaults for walking `root`: unbounded depth, no symlinks, directories included.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: usize::MAX,
            follow_symlinks: false,
            include_directories: true,
            excluded_paths: HashSet::new(),
        }
    }

    /// Walk `root` under the policy of a loaded `[walker]` config section.
    pub fn from_settings(root: impl Into<PathBuf>, settings: &WalkerSettings) -> Self {
        Self {
            root: root.into(),
            max_depth: settings.max_depth.unwrap_or(usize::MAX),
            follow_symlinks: settings.follow_symlinks,
            include_directories: settings.include_directories,
            excluded_paths: settings
                .excluded_paths
                .iter()
                .map(|path| resolve_absolute_path(path))
                .collect(),
        }
    }
}

/// A single file-system entry discovered during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Final path component, original casing.
    pub name: String,
    /// Absolute path.
    pub path: String,
    pub is_dir: bool,
}

impl FileRecord {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir: false,
        }
    }
}

/// Counters reported by one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkSummary {
    pub files: usize,
    pub directories: usize,
    /// Entries that could not be read (permission denied, vanished, ...).
    pub skipped: usize,
    /// True when the receiver went away before the walk finished.
    pub disconnected: bool,
}

/// Work item on the explicit traversal stack: (directory, depth).
type WorkItem = (PathBuf, usize);

/// Sequential directory walker with skip-and-continue error policy.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    config: WalkerConfig,
}

impl DirectoryWalker {
    pub fn new(mut config: WalkerConfig) -> Self {
        config.root = resolve_absolute_path(&config.root);
        Self { config }
    }

    /// Absolute root this walker starts from.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Fail fast when the root is missing or not a directory.
    pub fn check_root(&self) -> Result<()> {
        let meta = metadata_for_path(&self.config.root, true)
            .map_err(|source| FidxError::io(&self.config.root, source))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(FidxError::io(
                &self.config.root,
                std::io::Error::new(ErrorKind::NotADirectory, "walk root is not a directory"),
            ))
        }
    }

    /// Collect every record into memory.
    pub fn walk(&self) -> Result<Vec<FileRecord>> {
        self.check_root()?;
        let (tx, rx) = channel::unbounded();
        self.walk_into(&tx);
        drop(tx);
        Ok(rx.into_iter().collect())
    }

    /// Push records into `tx` until the tree is exhausted or the receiver disconnects.
    pub fn walk_into(&self, tx: &channel::Sender<FileRecord>) -> WalkSummary {
        let mut summary = WalkSummary::default();
        let mut stack: Vec<WorkItem> = vec![(self.config.root.clone(), 0)];
        let mut visited = HashSet::new();
        let _ = self.first_visit(&mut visited, &self.config.root);

        while let Some((dir_path, depth)) = stack.pop() {
            let entries = match fs::read_dir(&dir_path) {
                Ok(entries) => entries,
                Err(err) => {
                    summary.skipped += 1;
                    if err.kind() != ErrorKind::PermissionDenied && err.kind() != ErrorKind::NotFound
                    {
                        eprintln!(
                            "[FIDX-WALKER] skipping {}: {err}",
                            dir_path.display()
                        );
                    }
                    continue;
                }
            };

            for entry_result in entries {
                let Ok(entry) = entry_result else {
                    summary.skipped += 1;
                    continue;
                };
                let child_path = entry.path();
                if self.config.excluded_paths.contains(&child_path) {
                    continue;
                }

                // file_type() is usually served from the directory entry itself.
                let Ok(ft) = entry.file_type() else {
                    summary.skipped += 1;
                    continue;
                };
                if ft.is_symlink() && !self.config.follow_symlinks {
                    continue;
                }
                let (is_dir, is_file) = if ft.is_symlink() {
                    match metadata_for_path(&child_path, true) {
                        Ok(meta) => (meta.is_dir(), meta.is_file()),
                        Err(_) => {
                            summary.skipped += 1;
                            continue;
                        }
                    }
                } else {
                    (ft.is_dir(), ft.is_file())
                };

                if is_dir {
                    summary.directories += 1;
                    if self.config.include_directories
                        && !emit(tx, &entry.file_name(), &child_path, true)
                    {
                        summary.disconnected = true;
                        return summary;
                    }
                    if depth < self.config.max_depth && self.first_visit(&mut visited, &child_path)
                    {
                        stack.push((child_path, depth + 1));
                    }
                } else if is_file {
                    summary.files += 1;
                    if !emit(tx, &entry.file_name(), &child_path, false) {
                        summary.disconnected = true;
                        return summary;
                    }
                }
            }
        }

        summary
    }

    /// Symlinked directories can form cycles; descend into each real directory once.
    fn first_visit(&self, visited: &mut HashSet<PathBuf>, dir: &Path) -> bool {
        if !self.config.follow_symlinks {
            return true;
        }
        fs::canonicalize(dir).map_or(true, |real| visited.insert(real))
    }
}

/// Send one record; `false` once the receiving side is gone.
fn emit(
    tx: &channel::Sender<FileRecord>,
    name: &std::ffi::OsStr,
    path: &Path,
    is_dir: bool,
) -> bool {
    tx.send(FileRecord {
        name: name.to_string_lossy().into_owned(),
        path: path.to_string_lossy().into_owned(),
        is_dir,
    })
    .is_ok()
}

fn metadata_for_path(path: &Path, follow_symlinks: bool) -> std::io::Result<fs::Metadata> {
    if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}
