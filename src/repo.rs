//! Repository Gateway — all reads/writes against git (spec.md §4.3).
//!
//! Read-only introspection (current branch, branch existence, status) goes
//! through `git2` directly, grounded on the teacher workspace's own
//! `dx-forge`/`forge` crates (`git2 = "0.19.0"`). `git worktree` has no
//! public `git2` API, so worktree add/remove and the porcelain worktree
//! listing shell out to the `git` binary via the Process Runner, matching
//! how every comparable Rust worktree tool in the example pack does it.

use std::path::{Path, PathBuf};

use crate::error::{SproutError, SproutResult};
use crate::process::{self, RunOptions};

pub struct RepositoryGateway {
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFileEntry {
    pub path: String,
    pub status: String,
}

impl RepositoryGateway {
    /// Locate the repository root by walking up from `start`. Returns
    /// [`SproutError::NotInRepo`] when no ancestor is a git repository.
    pub fn discover(start: &Path) -> SproutResult<Self> {
        let repo = git2::Repository::discover(start).map_err(|_| SproutError::NotInRepo)?;
        let root = repo
            .workdir()
            .map(|p| p.to_path_buf())
            .ok_or(SproutError::NotInRepo)?;
        Ok(Self { root })
    }

    fn open(&self) -> SproutResult<git2::Repository> {
        git2::Repository::open(&self.root).map_err(|_| SproutError::NotInRepo)
    }

    /// The canonical repo name: basename of the parent of the common git
    /// directory, so it is identical from any worktree of this repository.
    pub fn repo_name(&self) -> String {
        let repo = match self.open() {
            Ok(r) => r,
            Err(_) => {
                return self
                    .root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "repo".to_string())
            }
        };
        let common_dir = repo.path(); // e.g. /path/to/repo/.git, or .git/worktrees/x resolves to main .git
        let git_dir_parent = common_dir.parent();
        git_dir_parent
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| {
                self.root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "repo".to_string())
            })
    }

    /// Symbolic short name of HEAD, empty string on detached HEAD.
    pub fn current_branch(&self) -> SproutResult<String> {
        let repo = self.open()?;
        let head = match repo.head() {
            Ok(h) => h,
            Err(_) => return Ok(String::new()),
        };
        if !head.is_branch() {
            return Ok(String::new());
        }
        Ok(head.shorthand().unwrap_or_default().to_string())
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        let repo = match self.open() {
            Ok(r) => r,
            Err(_) => return false,
        };
        repo.find_branch(name, git2::BranchType::Local).is_ok()
    }

    /// Resolve the base branch per spec.md §4.3: caller-requested branch
    /// must exist; else configured default if it exists; else current
    /// branch; else error.
    pub fn resolve_base_branch(
        &self,
        requested: Option<&str>,
        configured_default: Option<&str>,
    ) -> SproutResult<String> {
        if let Some(req) = requested {
            return if self.branch_exists(req) {
                Ok(req.to_string())
            } else {
                Err(SproutError::BaseBranchMissing(req.to_string()))
            };
        }
        if let Some(def) = configured_default {
            if self.branch_exists(def) {
                return Ok(def.to_string());
            }
        }
        let current = self.current_branch()?;
        if !current.is_empty() {
            return Ok(current);
        }
        Err(SproutError::BaseBranchMissing("<none configured>".to_string()))
    }

    /// All local branches plus remote-tracking branches not already
    /// checked out and (for remotes) not shadowed by a local branch of the
    /// same name. Sorted lexicographically.
    pub fn list_branches(&self) -> SproutResult<Vec<String>> {
        let repo = self.open()?;
        let checked_out: std::collections::HashSet<String> = self
            .parse_worktree_list()?
            .into_iter()
            .map(|w| w.branch)
            .collect();

        let mut locals = std::collections::HashSet::new();
        let mut out = Vec::new();

        let branches = repo
            .branches(Some(git2::BranchType::Local))
            .map_err(|e| SproutError::VcsFailure("git2::branches".into(), -1, e.to_string()))?;
        for entry in branches {
            let (branch, _) = entry.map_err(|e| SproutError::VcsFailure("git2::branches".into(), -1, e.to_string()))?;
            if let Some(name) = branch.name().ok().flatten() {
                locals.insert(name.to_string());
                out.push(name.to_string());
            }
        }

        let remotes = repo
            .branches(Some(git2::BranchType::Remote))
            .map_err(|e| SproutError::VcsFailure("git2::branches".into(), -1, e.to_string()))?;
        for entry in remotes {
            let (branch, _) = entry.map_err(|e| SproutError::VcsFailure("git2::branches".into(), -1, e.to_string()))?;
            let Some(full_name) = branch.name().ok().flatten() else { continue };
            let Some((_, stripped)) = full_name.split_once('/') else { continue };
            if locals.contains(stripped) || checked_out.contains(stripped) {
                continue;
            }
            if !out.contains(&stripped.to_string()) {
                out.push(stripped.to_string());
            }
        }

        out.sort();
        Ok(out)
    }

    /// `git worktree list --porcelain`, parsed into path/branch records.
    pub fn parse_worktree_list(&self) -> SproutResult<Vec<WorktreeEntry>> {
        let opts = RunOptions::new().cwd(&self.root);
        let output = process::run_captured("git", &to_args(&["worktree", "list", "--porcelain"]), &opts)?;

        let mut entries = Vec::new();
        let mut path: Option<PathBuf> = None;
        let mut branch = String::new();

        for line in output.lines() {
            if line.is_empty() {
                if let Some(p) = path.take() {
                    entries.push(WorktreeEntry { path: p, branch: std::mem::take(&mut branch) });
                }
                continue;
            }
            if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(p));
            } else if let Some(b) = line.strip_prefix("branch ") {
                branch = b.strip_prefix("refs/heads/").unwrap_or(b).to_string();
            }
        }
        if let Some(p) = path.take() {
            entries.push(WorktreeEntry { path: p, branch });
        }
        Ok(entries)
    }

    /// `git worktree add -b <branch> <path> <base>`, retrying once after
    /// a prune on a matching error substring.
    pub fn create_worktree_with_branch(
        &self,
        branch: &str,
        path: &Path,
        base: &str,
    ) -> SproutResult<()> {
        if self.branch_exists(branch) {
            return Err(SproutError::BranchAlreadyExists(branch.to_string()));
        }
        if path.exists() {
            return Err(SproutError::TargetPathExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SproutError::CopyFailure(parent.to_path_buf(), e.to_string()))?;
        }

        let args = to_args(&[
            "worktree",
            "add",
            "-b",
            branch,
            &path.to_string_lossy(),
            base,
        ]);
        self.run_worktree_mutation(&args, process::ADD_RETRY_SUBSTRINGS)
    }

    /// `git worktree add <path> <branch>` for an existing branch. If a
    /// worktree already exists for that branch, this is a no-op that
    /// returns the existing path instead of failing.
    pub fn create_worktree_from_existing(&self, branch: &str, path: &Path) -> SproutResult<PathBuf> {
        if let Some(existing) = self
            .parse_worktree_list()?
            .into_iter()
            .find(|w| w.branch == branch)
        {
            return Ok(existing.path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SproutError::CopyFailure(parent.to_path_buf(), e.to_string()))?;
        }
        let args = to_args(&["worktree", "add", &path.to_string_lossy(), branch]);
        self.run_worktree_mutation(&args, process::ADD_RETRY_SUBSTRINGS)?;
        Ok(path.to_path_buf())
    }

    /// `git worktree remove [--force]`, retrying once after a prune on a
    /// matching error substring. The caller is responsible for killing any
    /// live tmux session for this worktree between attempts.
    pub fn remove_worktree(&self, path: &Path, force: bool, mut on_retry: impl FnMut()) -> SproutResult<()> {
        let mut args = vec!["worktree".to_string(), "remove".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(path.to_string_lossy().into_owned());

        let opts = RunOptions::new().cwd(&self.root).timeout(process::worktree_timeout());
        match process::run_captured("git", &args, &opts) {
            Ok(_) => Ok(()),
            Err(SproutError::VcsFailure(argv, code, msg))
                if process::matches_retry_substring(&msg, process::REMOVE_RETRY_SUBSTRINGS) =>
            {
                on_retry();
                self.prune()?;
                let opts = RunOptions::new().cwd(&self.root).timeout(process::worktree_timeout());
                process::run_captured("git", &args, &opts).map(|_| ())
                    .map_err(|_| SproutError::VcsFailure(argv, code, msg))
            }
            Err(e) => Err(e),
        }
    }

    fn run_worktree_mutation(&self, args: &[String], retry_substrings: &[&str]) -> SproutResult<()> {
        let opts = RunOptions::new().cwd(&self.root).timeout(process::worktree_timeout());
        match process::run_captured("git", args, &opts) {
            Ok(_) => Ok(()),
            Err(SproutError::VcsFailure(argv, code, msg))
                if process::matches_retry_substring(&msg, retry_substrings) =>
            {
                self.prune()?;
                let opts = RunOptions::new().cwd(&self.root).timeout(process::worktree_timeout());
                process::run_captured("git", args, &opts).map(|_| ())
                    .map_err(|_| SproutError::VcsFailure(argv, code, msg))
            }
            Err(e) => Err(e),
        }
    }

    pub fn prune(&self) -> SproutResult<()> {
        let opts = RunOptions::new().cwd(&self.root);
        process::run_captured("git", &to_args(&["worktree", "prune"]), &opts).map(|_| ())
    }

    /// Delete a local branch. `force` selects `-D` over `-d`.
    pub fn delete_branch(&self, branch: &str, force: bool) -> SproutResult<()> {
        let flag = if force { "-D" } else { "-d" };
        let opts = RunOptions::new().cwd(&self.root);
        process::run_captured("git", &to_args(&["branch", flag, branch]), &opts).map(|_| ())
    }

    /// Any non-empty porcelain status (untracked included) means dirty.
    pub fn is_dirty(&self, worktree_path: &Path) -> SproutResult<bool> {
        let opts = RunOptions::new().cwd(worktree_path);
        let out = process::run_captured(
            "git",
            &to_args(&["status", "--porcelain", "--untracked-files=all"]),
            &opts,
        )?;
        Ok(!out.trim().is_empty())
    }

    /// Parse porcelain status output into a de-duplicated `(path, status)`
    /// list; rename/copy source lines resolve to the destination path.
    pub fn diff_file_list(&self, worktree_path: &Path) -> SproutResult<Vec<DiffFileEntry>> {
        let opts = RunOptions::new().cwd(worktree_path);
        let out = process::run_captured(
            "git",
            &to_args(&["status", "--porcelain", "--untracked-files=all"]),
            &opts,
        )?;

        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.len() < 4 {
                continue;
            }
            let status = line[..2].to_string();
            let rest = line[3..].trim();
            // rename/copy lines look like "old -> new"
            let path = rest.split(" -> ").last().unwrap_or(rest).to_string();
            if seen.insert(path.clone()) {
                entries.push(DiffFileEntry { path, status });
            }
        }
        Ok(entries)
    }

    /// Unified-diff for a single tracked or untracked file. Untracked
    /// files are diffed against `/dev/null`, with exit code 1 allowed.
    /// `width_hint`, when given, pipes the result through `delta` if it's
    /// on PATH; absent `delta`, the raw patch is returned unchanged.
    pub fn diff_for_file(
        &self,
        worktree_path: &Path,
        relative_path: &str,
        width_hint: Option<u16>,
    ) -> SproutResult<String> {
        let status = self
            .diff_file_list(worktree_path)?
            .into_iter()
            .find(|e| e.path == relative_path)
            .map(|e| e.status);

        if status.as_deref() == Some("??") {
            let opts = RunOptions::new().cwd(worktree_path).allow_exit_codes([1]);
            let out = process::run_captured(
                "git",
                &to_args(&["diff", "--no-index", "--", "/dev/null", relative_path]),
                &opts,
            );
            return match out {
                Ok(text) if !text.trim().is_empty() => Ok(pretty_print(&text, width_hint)),
                _ => Ok(format!("(no textual diff available for {relative_path})")),
            };
        }

        let opts = RunOptions::new().cwd(worktree_path);
        let staged = process::run_captured(
            "git",
            &to_args(&["diff", "--cached", "--", relative_path]),
            &opts,
        )
        .unwrap_or_default();
        let unstaged = process::run_captured("git", &to_args(&["diff", "--", relative_path]), &opts)
            .unwrap_or_default();
        let combined = format!("{staged}{unstaged}");
        if combined.trim().is_empty() {
            Ok(format!("(no textual diff available for {relative_path})"))
        } else {
            Ok(pretty_print(&combined, width_hint))
        }
    }

    /// Short-status header + staged patch + unstaged patch, concatenated.
    /// `width_hint`, when given, pipes each non-empty section through
    /// `delta` if it's on PATH; absent `delta`, sections are concatenated
    /// as plain text.
    pub fn diff_snapshot(&self, worktree_path: &Path, width_hint: Option<u16>) -> SproutResult<String> {
        let opts = RunOptions::new().cwd(worktree_path);
        let header = process::run_captured("git", &to_args(&["status", "--short"]), &opts)
            .unwrap_or_default();
        let staged = process::run_captured("git", &to_args(&["diff", "--cached"]), &opts)
            .unwrap_or_default();
        let unstaged = process::run_captured("git", &to_args(&["diff"]), &opts).unwrap_or_default();

        let mut out = String::new();
        for section in [header, staged, unstaged] {
            if !section.trim().is_empty() {
                out.push_str(&pretty_print(&section, width_hint));
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Pipe `text` through `delta --width <width_hint>` when both a width
/// hint is given and `delta` is on PATH; otherwise return `text`
/// unchanged. `delta` failing (non-zero exit, not installed) falls back
/// to the raw text rather than dropping the diff.
fn pretty_print(text: &str, width_hint: Option<u16>) -> String {
    let Some(width) = width_hint else { return text.to_string() };
    if !crate::session::which("delta") {
        return text.to_string();
    }
    let opts = RunOptions::new().stdin(text.as_bytes().to_vec());
    let width_arg = width.to_string();
    let args = to_args(&["--width", &width_arg, "--paging", "never"]);
    process::run_captured("delta", &args, &opts).unwrap_or_else(|_| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo(dir: &Path) {
        Command::new("git").args(["init", "-q"]).current_dir(dir).status().unwrap();
        Command::new("git").args(["config", "user.email", "t@example.com"]).current_dir(dir).status().unwrap();
        Command::new("git").args(["config", "user.name", "Test"]).current_dir(dir).status().unwrap();
        std::fs::write(dir.join("README.md"), "hi").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).status().unwrap();
        Command::new("git").args(["commit", "-q", "-m", "init"]).current_dir(dir).status().unwrap();
    }

    #[test]
    fn discover_finds_repo_root_and_name() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let gw = RepositoryGateway::discover(tmp.path()).unwrap();
        assert_eq!(gw.root, tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn current_branch_reports_default_branch() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let gw = RepositoryGateway::discover(tmp.path()).unwrap();
        let branch = gw.current_branch().unwrap();
        assert!(!branch.is_empty());
    }

    #[test]
    fn create_worktree_with_branch_rejects_existing_branch() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let gw = RepositoryGateway::discover(tmp.path()).unwrap();
        let base = gw.current_branch().unwrap();
        Command::new("git").args(["branch", "feat/dup"]).current_dir(&gw.root).status().unwrap();

        let err = gw
            .create_worktree_with_branch("feat/dup", &tmp.path().join("wt"), &base)
            .unwrap_err();
        assert!(matches!(err, SproutError::BranchAlreadyExists(_)));
    }

    #[test]
    fn create_worktree_from_existing_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let gw = RepositoryGateway::discover(tmp.path()).unwrap();
        Command::new("git").args(["branch", "shared"]).current_dir(&gw.root).status().unwrap();

        let wt_path = tmp.path().join("wt-shared");
        let first = gw.create_worktree_from_existing("shared", &wt_path).unwrap();
        let second = gw.create_worktree_from_existing("shared", &wt_path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn dirty_detects_untracked_file() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let gw = RepositoryGateway::discover(tmp.path()).unwrap();
        assert!(!gw.is_dirty(&gw.root).unwrap());
        std::fs::write(gw.root.join("u.txt"), "x").unwrap();
        assert!(gw.is_dirty(&gw.root).unwrap());
    }
}
