//! Tree Copier / Deleter — scoped, cancellable bulk filesystem operations
//! with a two-phase "scan-then-act" protocol (spec.md §4.4).
//!
//! Untracked and ignored files are found via `git status --porcelain=v2
//! -z --ignored`, the same trick `git2` doesn't model directly (it treats
//! ignored-file enumeration as a status callback, not a batch listing) —
//! shelling out through the Process Runner keeps this symmetric with the
//! Repository Gateway's other porcelain calls.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ExclusionSet;
use crate::error::{SproutError, SproutResult};
use crate::process::{self, RunOptions};

const PROGRESS_THROTTLE: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Act,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub phase: Phase,
    pub files_done: u64,
    pub files_total: u64,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Cooperative cancellation token, checked in the copier's inner loop.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Untracked (`?`) and ignored (`!`) relative paths, sorted and
/// de-duplicated, excluding the `.git` metadata directory.
pub fn list_untracked_and_ignored(repo_root: &Path) -> SproutResult<Vec<String>> {
    let opts = RunOptions::new().cwd(repo_root);
    let output = process::run_captured(
        "git",
        &[
            "status".to_string(),
            "--porcelain=v2".to_string(),
            "-z".to_string(),
            "--ignored".to_string(),
            "--untracked-files=all".to_string(),
        ],
        &opts,
    )?;

    let mut paths: Vec<String> = output
        .split('\0')
        .filter(|rec| rec.starts_with("? ") || rec.starts_with("! "))
        .map(|rec| rec[2..].to_string())
        .filter(|p| !p.is_empty() && p != ".git" && !p.starts_with(".git/"))
        .collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}

pub struct CopyJob<'a> {
    pub source_root: &'a Path,
    pub dest_root: &'a Path,
    pub exclude: &'a ExclusionSet,
    pub cancel: CancelToken,
}

impl<'a> CopyJob<'a> {
    /// SCAN then ACT. `on_progress` is called at most ~120ms apart, or
    /// once per completed file, whichever is less frequent.
    pub fn run(&self, mut on_progress: impl FnMut(Progress)) -> SproutResult<()> {
        let relative_paths = list_untracked_and_ignored(self.source_root)?
            .into_iter()
            .filter(|p| !self.exclude.is_excluded(p))
            .collect::<Vec<_>>();

        // SCAN
        let mut files_total = 0u64;
        let mut bytes_total = 0u64;
        for rel in &relative_paths {
            let src = self.source_root.join(rel);
            if let Ok(meta) = fs::symlink_metadata(&src) {
                if meta.is_file() {
                    files_total += 1;
                    bytes_total += meta.len();
                } else if meta.file_type().is_symlink() {
                    files_total += 1;
                }
                // directories don't count toward file/byte totals; their
                // contents are walked and counted individually below.
            }
        }
        on_progress(Progress {
            phase: Phase::Scan,
            files_done: 0,
            files_total,
            bytes_done: 0,
            bytes_total,
        });

        // ACT
        let mut files_done = 0u64;
        let mut bytes_done = 0u64;
        let mut last_emit = Instant::now();

        for rel in &relative_paths {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let src = self.source_root.join(rel);
            let dest = self.dest_root.join(rel);
            let bytes = self.copy_one(&src, &dest)?;
            files_done += 1;
            bytes_done += bytes;

            if last_emit.elapsed() >= PROGRESS_THROTTLE {
                on_progress(Progress {
                    phase: Phase::Act,
                    files_done,
                    files_total,
                    bytes_done,
                    bytes_total,
                });
                last_emit = Instant::now();
            }
        }
        on_progress(Progress {
            phase: Phase::Act,
            files_done,
            files_total,
            bytes_done,
            bytes_total,
        });
        Ok(())
    }

    fn copy_one(&self, src: &Path, dest: &Path) -> SproutResult<u64> {
        let meta = fs::symlink_metadata(src)
            .map_err(|e| SproutError::CopyFailure(src.to_path_buf(), e.to_string()))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(src)
                .map_err(|e| SproutError::CopyFailure(src.to_path_buf(), e.to_string()))?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| SproutError::CopyFailure(parent.to_path_buf(), e.to_string()))?;
            }
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, dest)
                .map_err(|e| SproutError::CopyFailure(dest.to_path_buf(), e.to_string()))?;
            #[cfg(not(unix))]
            fs::copy(&target, dest)
                .map_err(|e| SproutError::CopyFailure(dest.to_path_buf(), e.to_string()))?;
            return Ok(0);
        }

        if meta.is_dir() {
            self.copy_dir_recursive(src, dest, &meta)
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| SproutError::CopyFailure(parent.to_path_buf(), e.to_string()))?;
            }
            fs::copy(src, dest)
                .map_err(|e| SproutError::CopyFailure(dest.to_path_buf(), e.to_string()))?;
            apply_mode(dest, &meta);
            restore_mtime(dest, &meta);
            Ok(meta.len())
        }
    }

    fn copy_dir_recursive(&self, src: &Path, dest: &Path, meta: &fs::Metadata) -> SproutResult<u64> {
        fs::create_dir_all(dest).map_err(|e| SproutError::CopyFailure(dest.to_path_buf(), e.to_string()))?;
        apply_mode(dest, meta);

        let mut total = 0u64;
        let read_dir = fs::read_dir(src).map_err(|e| SproutError::CopyFailure(src.to_path_buf(), e.to_string()))?;
        for entry in read_dir {
            let entry = entry.map_err(|e| SproutError::CopyFailure(src.to_path_buf(), e.to_string()))?;
            if self.cancel.is_cancelled() {
                return Ok(total);
            }
            let child_src = entry.path();
            let child_dest = dest.join(entry.file_name());
            total += self.copy_one(&child_src, &child_dest)?;
        }
        Ok(total)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, meta: &fs::Metadata) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(meta.permissions().mode()));
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _meta: &fs::Metadata) {}

fn restore_mtime(path: &Path, meta: &fs::Metadata) {
    if let Ok(modified) = meta.modified() {
        if let Ok(file) = fs::File::open(path) {
            let _ = file.set_modified(modified);
        }
    }
}

/// Scoped delete: SCAN the destination tree then ACT bottom-up.
pub struct DeleteJob<'a> {
    pub root: &'a Path,
    pub cancel: CancelToken,
}

impl<'a> DeleteJob<'a> {
    pub fn run(&self, mut on_progress: impl FnMut(Progress)) -> SproutResult<()> {
        let mut entries: Vec<PathBuf> = Vec::new();
        let mut files_total = 0u64;
        let mut bytes_total = 0u64;

        for entry in walkdir::WalkDir::new(self.root).contents_first(false) {
            let entry = entry.map_err(|e| SproutError::CopyFailure(self.root.to_path_buf(), e.to_string()))?;
            if entry.file_type().is_file() {
                files_total += 1;
                bytes_total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
            entries.push(entry.path().to_path_buf());
        }
        on_progress(Progress {
            phase: Phase::Scan,
            files_done: 0,
            files_total,
            bytes_done: 0,
            bytes_total,
        });

        // Bottom-up: walkdir's contents_first(true) ordering is what we
        // actually need for the delete pass itself.
        let mut files_done = 0u64;
        let mut bytes_done = 0u64;
        let mut last_emit = Instant::now();

        for entry in walkdir::WalkDir::new(self.root).contents_first(true) {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let entry = entry.map_err(|e| SproutError::CopyFailure(self.root.to_path_buf(), e.to_string()))?;
            let path = entry.path();
            let is_file = entry.file_type().is_file();
            let size = if is_file {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            } else {
                0
            };

            if entry.file_type().is_dir() {
                let _ = fs::remove_dir(path);
            } else if entry.file_type().is_symlink() {
                let _ = fs::remove_file(path);
            } else {
                fs::remove_file(path)
                    .map_err(|e| SproutError::CopyFailure(path.to_path_buf(), e.to_string()))?;
            }

            if is_file {
                files_done += 1;
                bytes_done += size;
            }

            if last_emit.elapsed() >= PROGRESS_THROTTLE {
                on_progress(Progress {
                    phase: Phase::Act,
                    files_done,
                    files_total,
                    bytes_done,
                    bytes_total,
                });
                last_emit = Instant::now();
            }
        }
        on_progress(Progress {
            phase: Phase::Act,
            files_done,
            files_total,
            bytes_done,
            bytes_total,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo_with_untracked(dir: &Path) {
        Command::new("git").args(["init", "-q"]).current_dir(dir).status().unwrap();
        fs::write(dir.join(".gitignore"), "build/\n*.log\n").unwrap();
        fs::create_dir_all(dir.join("build/output")).unwrap();
        fs::write(dir.join("build/output/app"), "bin").unwrap();
        fs::write(dir.join("notes.txt"), "hello").unwrap();
        fs::create_dir_all(dir.join("logs")).unwrap();
        fs::write(dir.join("logs/app.log"), "log").unwrap();
    }

    #[test]
    fn copy_carries_untracked_files_and_respects_exclusions() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        init_repo_with_untracked(src.path());

        let exclude = ExclusionSet::compile(&["build".to_string(), "*.log".to_string()]);
        let job = CopyJob {
            source_root: src.path(),
            dest_root: dest.path(),
            exclude: &exclude,
            cancel: CancelToken::new(),
        };
        job.run(|_| {}).unwrap();

        assert!(dest.path().join("notes.txt").exists());
        assert!(!dest.path().join("build").exists());
        assert!(!dest.path().join("logs/app.log").exists());
    }

    #[test]
    fn delete_removes_entire_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/file.txt"), "x").unwrap();

        let job = DeleteJob { root: dir.path(), cancel: CancelToken::new() };
        job.run(|_| {}).unwrap();

        assert!(!dir.path().join("a/b/file.txt").exists());
    }

    #[test]
    fn cancellation_stops_the_act_phase_early() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        init_repo_with_untracked(src.path());

        let exclude = ExclusionSet::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let job = CopyJob {
            source_root: src.path(),
            dest_root: dest.path(),
            exclude: &exclude,
            cancel,
        };
        job.run(|_| {}).unwrap();
        assert!(!dest.path().join("notes.txt").exists());
    }
}
