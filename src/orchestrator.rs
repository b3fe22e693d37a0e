//! Orchestrator ("Manager") — the public façade (spec.md §4.6).
//!
//! External callers (CLI command handlers) only talk to this type. It owns
//! a [`Configuration`] and composes the Repository Gateway, Tree Copier and
//! Session Coordinator, each of which goes through the Process Runner.

use std::path::{Path, PathBuf};

use crate::ansi::strip_ansi;
use crate::config::Configuration;
use crate::config::windows::WindowSpec;
use crate::copier::{CancelToken, CopyJob, Progress};
use crate::error::{SproutError, SproutResult};
use crate::naming;
use crate::repo::{RepositoryGateway, WorktreeEntry};
use crate::session::{self, SessionCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmuxState {
    Alive,
    Dead,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Ready,
    Busy,
    Offline,
    Running,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeRecord {
    pub path: PathBuf,
    pub branch: String,
    pub current: bool,
    pub dirty: bool,
    pub tmux_state: TmuxState,
    pub agent_state: AgentState,
}

pub enum BranchSource {
    Explicit(String),
    TypeAndName(String, String),
    FromBranch(String),
}

pub struct NewWorktreeOpts {
    pub source: BranchSource,
    pub base_branch: Option<String>,
    pub launch: bool,
    pub skip_copy_untracked: bool,
}

pub struct GoOpts {
    pub target: String,
    pub attach: bool,
    pub launch: bool,
}

pub struct RemoveOpts {
    pub target: String,
    pub force: bool,
    pub delete_branch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Miss,
}

#[derive(Debug, Clone)]
pub struct DoctorCheck {
    pub status: CheckStatus,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
    pub exit_code: i32,
}

pub struct Orchestrator {
    pub config: Configuration,
    pub repo: RepositoryGateway,
    pub sessions: SessionCoordinator,
}

const PANE_ZERO: &str = ".0";

impl Orchestrator {
    pub fn new(config: Configuration, repo: RepositoryGateway) -> Self {
        Self { config, repo, sessions: SessionCoordinator::new() }
    }

    fn repo_name(&self) -> String {
        self.repo.repo_name()
    }

    fn session_name(&self, branch_or_basename: &str) -> String {
        naming::session_name_for_worktree(&self.config.session_prefix, &self.repo_name(), branch_or_basename)
    }

    fn agent_window(&self, branch: &str) -> String {
        naming::agent_window_name(branch)
    }

    fn main_window(&self, branch: &str) -> String {
        naming::main_window_name(branch)
    }

    fn git_window(&self, branch: &str) -> String {
        naming::git_window_name(branch)
    }

    /// spec.md §4.6 ListWorktrees.
    pub fn list_worktrees(&self) -> SproutResult<Vec<WorktreeRecord>> {
        let entries = self.repo.parse_worktree_list()?;
        let current_dir = std::env::current_dir().ok();
        let tmux_present = SessionCoordinator::is_available();

        let mut records: Vec<WorktreeRecord> = entries
            .into_iter()
            .map(|entry| self.record_for(entry, current_dir.as_deref(), tmux_present))
            .collect::<SproutResult<Vec<_>>>()?;

        records.sort_by(|a, b| match (a.current, b.current) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.path.cmp(&b.path),
        });
        Ok(records)
    }

    fn record_for(
        &self,
        entry: WorktreeEntry,
        current_dir: Option<&Path>,
        tmux_present: bool,
    ) -> SproutResult<WorktreeRecord> {
        let current = current_dir.map(|d| d == entry.path).unwrap_or(false);
        let dirty = self.repo.is_dirty(&entry.path).unwrap_or(false);

        let (tmux_state, agent_state) = if !tmux_present {
            (TmuxState::NotApplicable, AgentState::NotApplicable)
        } else {
            let basename = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let branch_or_basename = if entry.branch.is_empty() { basename } else { entry.branch.clone() };
            let session = self.session_name(&branch_or_basename);
            let tmux_state = if self.sessions.session_exists(&session) { TmuxState::Alive } else { TmuxState::Dead };
            let agent_state = self.agent_state_for(&session, &self.agent_window(&branch_or_basename));
            (tmux_state, agent_state)
        };

        Ok(WorktreeRecord { path: entry.path, branch: entry.branch, current, dirty, tmux_state, agent_state })
    }

    fn agent_state_for(&self, session: &str, window: &str) -> AgentState {
        if !self.sessions.window_exists(session, window) {
            return AgentState::Offline;
        }
        let target = format!("{session}:{window}{PANE_ZERO}");
        match self.sessions.capture_with_cursor(&target, 12) {
            Ok(text) => match classify_capture(&text) {
                ReadyOrBusy::Ready => AgentState::Ready,
                ReadyOrBusy::Busy => AgentState::Busy,
            },
            Err(_) => AgentState::Running,
        }
    }

    /// spec.md §4.6 FindWorktree.
    pub fn find_worktree(&self, target: &str) -> SproutResult<WorktreeEntry> {
        let entries = self.repo.parse_worktree_list()?;

        if let Some(hit) = entries.iter().find(|e| e.branch == target) {
            return Ok(hit.clone());
        }

        let as_path = PathBuf::from(target);
        if let Some(hit) = entries.iter().find(|e| e.path == as_path) {
            return Ok(hit.clone());
        }

        if let Some(hit) = entries
            .iter()
            .find(|e| e.path.file_name().map(|n| n == as_path.as_os_str()).unwrap_or(false))
        {
            return Ok(hit.clone());
        }

        if as_path.is_dir() {
            if let Ok(canonical) = as_path.canonicalize() {
                if let Some(hit) = entries.iter().find(|e| e.path == canonical) {
                    return Ok(hit.clone());
                }
            }
        }

        Err(SproutError::NotFound(target.to_string()))
    }

    /// spec.md §4.6 NewWorktree.
    pub fn new_worktree(
        &self,
        opts: NewWorktreeOpts,
        on_progress: impl FnMut(Progress),
    ) -> SproutResult<PathBuf> {
        let (branch, is_new_branch) = match &opts.source {
            BranchSource::Explicit(name) => (name.clone(), true),
            BranchSource::TypeAndName(branch_type, title) => {
                (naming::make_branch_name(branch_type, title)?, true)
            }
            BranchSource::FromBranch(name) => (name.clone(), false),
        };

        let worktree_root = self.config.worktree_root_for(&self.repo.root, &self.repo_name());
        let path = worktree_root.join(&branch);

        let final_path = if is_new_branch {
            let base = self.repo.resolve_base_branch(opts.base_branch.as_deref(), self.config.base_branch.as_deref())?;
            self.repo.create_worktree_with_branch(&branch, &path, &base)?;
            path
        } else {
            self.repo.create_worktree_from_existing(&branch, &path)?
        };

        if !opts.skip_copy_untracked {
            let job = CopyJob {
                source_root: &self.repo.root,
                dest_root: &final_path,
                exclude: &self.config.copy_untracked_exclude,
                cancel: CancelToken::new(),
            };
            job.run(on_progress)?;
        }

        if opts.launch {
            self.build_session(&branch, &final_path)?;
            self.focus(&branch, false)?;
        }

        Ok(final_path)
    }

    /// spec.md §4.6 Go.
    pub fn go(&self, opts: GoOpts) -> SproutResult<PathBuf> {
        let entry = self.find_worktree(&opts.target)?;
        let branch_or_basename = branch_or_basename(&entry);

        if opts.launch && SessionCoordinator::is_available() {
            self.build_session(&branch_or_basename, &entry.path)?;
            self.focus(&branch_or_basename, opts.attach)?;
        } else if !session::inside_tmux() && opts.attach && SessionCoordinator::is_available() {
            self.focus(&branch_or_basename, true)?;
        }

        Ok(entry.path)
    }

    /// spec.md §4.6 Launch.
    pub fn launch(&self, target: &str, no_attach: bool) -> SproutResult<PathBuf> {
        let entry = self.find_worktree(target)?;
        let branch_or_basename = branch_or_basename(&entry);
        self.build_session(&branch_or_basename, &entry.path)?;

        if !session::inside_tmux() && !no_attach {
            self.focus(&branch_or_basename, true)?;
        } else {
            self.focus(&branch_or_basename, false)?;
        }
        Ok(entry.path)
    }

    /// spec.md §4.6 Detach.
    pub fn detach(&self, target: &str) -> SproutResult<(PathBuf, bool)> {
        let entry = self.find_worktree(target)?;
        let session = self.session_name(&branch_or_basename(&entry));
        let was_alive = self.sessions.session_exists(&session);
        self.sessions.kill_session(&session)?;
        Ok((entry.path, was_alive))
    }

    /// spec.md §4.6 StartAgent.
    pub fn start_agent(&self, target: &str, attach: bool) -> SproutResult<(PathBuf, bool)> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        self.build_session(&branch, &entry.path)?;

        let session = self.session_name(&branch);
        let window = self.agent_window(&branch);
        let already_running = self.sessions.window_exists(&session, &window);
        if !already_running {
            let command = self.config.agent_command_for(self.config.default_agent_type.as_deref());
            self.sessions.ensure_window(&session, &window, &entry.path, &command)?;
        }
        if attach {
            self.sessions.focus(&session, &window, !session::inside_tmux())?;
        }
        Ok((entry.path, already_running))
    }

    /// spec.md §4.6 StopAgent.
    pub fn stop_agent(&self, target: &str) -> SproutResult<(PathBuf, bool)> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let session = self.session_name(&branch);
        let window = self.agent_window(&branch);
        let was_running = self.sessions.window_exists(&session, &window);
        self.sessions.kill_window(&session, &window)?;
        Ok((entry.path, was_running))
    }

    /// spec.md §4.6 AttachAgent.
    pub fn attach_agent(&self, target: &str) -> SproutResult<PathBuf> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let session = self.session_name(&branch);
        let window = self.agent_window(&branch);
        self.sessions.focus(&session, &window, !session::inside_tmux())?;
        Ok(entry.path)
    }

    /// spec.md §4.6 Remove.
    pub fn remove(&self, opts: RemoveOpts) -> SproutResult<(PathBuf, Vec<String>)> {
        let entry = self.find_worktree(&opts.target)?;
        let branch = branch_or_basename(&entry);
        let mut warnings = Vec::new();

        if !opts.force && self.repo.is_dirty(&entry.path)? {
            return Err(SproutError::DirtyWorktree);
        }

        let session = self.session_name(&branch);
        self.sessions.kill_session(&session)?;

        self.repo.remove_worktree(&entry.path, opts.force, || {
            let _ = self.sessions.kill_session(&session);
        })?;

        if opts.delete_branch && !entry.branch.is_empty() {
            let still_checked_out = self
                .repo
                .parse_worktree_list()
                .map(|list| list.iter().any(|w| w.branch == entry.branch))
                .unwrap_or(false);
            if still_checked_out {
                warnings.push(format!("branch {:?} is still checked out elsewhere; skipped delete", entry.branch));
            } else if let Err(e) = self.repo.delete_branch(&entry.branch, opts.force) {
                warnings.push(format!("could not delete branch {:?}: {e}", entry.branch));
            }
        }

        Ok((entry.path, warnings))
    }

    /// spec.md §4.6 Doctor.
    pub fn doctor(&self) -> DoctorReport {
        let mut checks = Vec::new();

        checks.push(required_check("git", which("git")));
        checks.push(required_check("tmux", which("tmux")));
        checks.push(optional_check("delta (diff pretty-printer)", which("delta")));

        for tool in &self.config.session_tools {
            let (subject, present) = match tool.to_lowercase().as_str() {
                "agent" => {
                    let cmd = self.config.agent_command_for(self.config.default_agent_type.as_deref());
                    let first = first_token(&cmd);
                    (format!("agent ({first})"), which(first))
                }
                "nvim" | "neovim" => ("nvim".to_string(), which("nvim")),
                "lazygit" => ("lazygit".to_string(), which("lazygit")),
                other => {
                    let first = first_token(other);
                    (other.to_string(), which(first))
                }
            };
            checks.push(optional_check(&subject, present));
        }

        if let Ok(entries) = self.repo.parse_worktree_list() {
            for entry in entries {
                let path_ok = entry.path.is_dir();
                checks.push(required_check(&format!("worktree path {}", entry.path.display()), path_ok));
                if !entry.branch.is_empty() {
                    let branch_ok = self.repo.branch_exists(&entry.branch);
                    checks.push(required_check(&format!("branch {}", entry.branch), branch_ok));
                }
            }
        }

        let exit_code = if checks.iter().any(|c| c.status == CheckStatus::Miss) { 1 } else { 0 };
        DoctorReport { checks, exit_code }
    }

    /// spec.md §4.6 AgentOutput.
    pub fn agent_output(&self, target: &str, lines: usize) -> SproutResult<String> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let pane = format!("{}:{}{PANE_ZERO}", self.session_name(&branch), self.agent_window(&branch));
        self.sessions.capture_with_cursor(&pane, lines)
    }

    /// spec.md §4.6 LazygitOutput.
    pub fn lazygit_output(&self, target: &str, lines: usize) -> SproutResult<String> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let pane = format!("{}:{}{PANE_ZERO}", self.session_name(&branch), self.git_window(&branch));
        self.sessions.capture_with_cursor(&pane, lines)
    }

    /// spec.md §4.6 EditorOutput.
    pub fn editor_output(&self, target: &str, lines: usize) -> SproutResult<String> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let pane = format!("{}:{}{PANE_ZERO}", self.session_name(&branch), self.main_window(&branch));
        self.sessions.capture_with_cursor(&pane, lines)
    }

    pub fn send_agent_command(&self, target: &str, text: &str) -> SproutResult<()> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let pane = format!("{}:{}{PANE_ZERO}", self.session_name(&branch), self.agent_window(&branch));
        self.sessions.send_line(&pane, text)
    }

    pub fn send_agent_keys(&self, target: &str, keys: &str) -> SproutResult<()> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let pane = format!("{}:{}{PANE_ZERO}", self.session_name(&branch), self.agent_window(&branch));
        self.sessions.send_keys_raw(&pane, keys)
    }

    pub fn send_lazygit_command(&self, target: &str, keys: &str) -> SproutResult<()> {
        let entry = self.find_worktree(target)?;
        let branch = branch_or_basename(&entry);
        let pane = format!("{}:{}{PANE_ZERO}", self.session_name(&branch), self.git_window(&branch));
        self.sessions.send_keys_raw(&pane, keys)
    }

    fn build_session(&self, branch: &str, worktree_path: &Path) -> SproutResult<()> {
        let session = self.session_name(branch);
        let repo_name = self.repo_name();

        let structured = self.structured_windows_for(&repo_name);
        if !structured.is_empty() {
            return session::build_session_from_structured_windows(&self.sessions, &session, worktree_path, &structured);
        }

        if let Some(legacy) = self.config.legacy_layouts.get(&repo_name) {
            return self.build_session_from_legacy_layout(&session, worktree_path, legacy);
        }

        if !self.config.window_names_global.is_empty() {
            return self.build_session_from_global_windows(&session, worktree_path);
        }

        self.build_session_from_tool_list(&session, branch, worktree_path)
    }

    fn structured_windows_for(&self, repo_name: &str) -> Vec<WindowSpec> {
        if !self.config.structured_windows_repo_local.is_empty() {
            return self.config.structured_windows_repo_local.clone();
        }
        self.config.structured_windows_by_repo.get(repo_name).cloned().unwrap_or_default()
    }

    fn build_session_from_legacy_layout(
        &self,
        session: &str,
        worktree_path: &Path,
        layout: &std::collections::BTreeMap<String, std::collections::BTreeMap<usize, String>>,
    ) -> SproutResult<()> {
        let mut window_names: Vec<String> = Vec::new();
        for (window_name, panes) in layout {
            let name = naming::dedupe_name(window_name, &window_names);
            window_names.push(name.clone());

            let mut ordered: Vec<(&usize, &String)> = panes.iter().collect();
            ordered.sort_by_key(|(idx, _)| **idx);
            let Some((_, first_command)) = ordered.first() else { continue };

            if !self.sessions.session_exists(session) {
                self.sessions.ensure_session(session, &name, worktree_path, Some(first_command.as_str()))?;
            } else {
                self.sessions.ensure_window(session, &name, worktree_path, first_command)?;
            }

            for (_, command) in ordered.iter().skip(1) {
                let target = format!("{session}:{name}");
                crate::process::run_captured(
                    "tmux",
                    &[
                        "split-window".to_string(),
                        "-t".to_string(),
                        target,
                        "-c".to_string(),
                        worktree_path.to_string_lossy().into_owned(),
                        (*command).clone(),
                    ],
                    &crate::process::RunOptions::new(),
                )?;
            }
            if ordered.len() > 1 {
                let target = format!("{session}:{name}");
                crate::process::run_captured(
                    "tmux",
                    &["select-layout".to_string(), "-t".to_string(), target, "even-vertical".to_string()],
                    &crate::process::RunOptions::new(),
                )?;
            }
        }
        Ok(())
    }

    /// Global `window_<name>` keys: each is a named window with an
    /// ordered list of pane commands, all rooted at the worktree (no
    /// per-pane directory in this flat-key shorthand).
    fn build_session_from_global_windows(&self, session: &str, worktree_path: &Path) -> SproutResult<()> {
        let mut window_names: Vec<String> = Vec::new();
        for (window_name, commands) in &self.config.window_names_global {
            let name = naming::dedupe_name(window_name, &window_names);
            window_names.push(name.clone());

            let Some(first_command) = commands.first() else { continue };

            if !self.sessions.session_exists(session) {
                self.sessions.ensure_session(session, &name, worktree_path, Some(first_command.as_str()))?;
            } else {
                self.sessions.ensure_window(session, &name, worktree_path, first_command)?;
            }

            for command in commands.iter().skip(1) {
                let target = format!("{session}:{name}");
                crate::process::run_captured(
                    "tmux",
                    &[
                        "split-window".to_string(),
                        "-t".to_string(),
                        target,
                        "-c".to_string(),
                        worktree_path.to_string_lossy().into_owned(),
                        command.clone(),
                    ],
                    &crate::process::RunOptions::new(),
                )?;
            }
            if commands.len() > 1 {
                let target = format!("{session}:{name}");
                crate::process::run_captured(
                    "tmux",
                    &["select-layout".to_string(), "-t".to_string(), target, "even-horizontal".to_string()],
                    &crate::process::RunOptions::new(),
                )?;
            }
        }
        Ok(())
    }

    fn build_session_from_tool_list(&self, session: &str, branch: &str, worktree_path: &Path) -> SproutResult<()> {
        let mut window_names: Vec<String> = Vec::new();
        let mut created_any = false;

        for tool in &self.config.session_tools {
            let (name, command): (String, String) = match tool.to_lowercase().as_str() {
                "agent" => (self.agent_window(branch), self.config.agent_command_for(self.config.default_agent_type.as_deref())),
                "lazygit" if which("lazygit") => (self.git_window(branch), "lazygit -p .".to_string()),
                "lazygit" => continue,
                "nvim" | "neovim" if which("nvim") => (self.main_window(branch), "nvim .".to_string()),
                "nvim" | "neovim" => continue,
                other => (naming::tool_window_name(other, &window_names), other.to_string()),
            };
            window_names.push(name.clone());

            if !self.sessions.session_exists(session) {
                self.sessions.ensure_session(session, &name, worktree_path, Some(command.as_str()))?;
            } else {
                self.sessions.ensure_window(session, &name, worktree_path, &command)?;
            }
            created_any = true;
        }

        if !created_any {
            self.sessions.ensure_session(session, &self.main_window(branch), worktree_path, None)?;
        }
        Ok(())
    }

    fn focus(&self, branch: &str, attach_outside: bool) -> SproutResult<()> {
        let session = self.session_name(branch);
        let window = self.main_window(branch);
        self.sessions.focus(&session, &window, attach_outside)
    }
}

fn branch_or_basename(entry: &WorktreeEntry) -> String {
    if !entry.branch.is_empty() {
        entry.branch.clone()
    } else {
        entry.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

fn required_check(subject: &str, present: bool) -> DoctorCheck {
    DoctorCheck { status: if present { CheckStatus::Ok } else { CheckStatus::Miss }, subject: subject.to_string() }
}

fn optional_check(subject: &str, present: bool) -> DoctorCheck {
    DoctorCheck { status: if present { CheckStatus::Ok } else { CheckStatus::Warn }, subject: subject.to_string() }
}

fn first_token(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

fn which(bin: &str) -> bool {
    session::which(bin)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyOrBusy {
    Ready,
    Busy,
}

const PROMPT_TOKENS: &[&str] = &[">>>", ">>", ">", "$", "#", ":", "›", "❯", "➜"];

const READY_SUBSTRINGS: &[&str] = &[
    "for shortcuts",
    "context left",
    "awaiting your input",
    "waiting for your input",
    "ready for your next instruction",
    "what would you like to do next",
    "enter your prompt",
];

const CURSOR_GLYPH: char = '█';

/// spec.md §4.6 ready-vs-busy derivation, and invariant 9 (§8).
fn classify_capture(capture: &str) -> ReadyOrBusy {
    let plain = strip_ansi(capture);
    let last_lines: Vec<&str> = plain.lines().filter(|l| !l.trim().is_empty()).rev().take(12).collect();

    for line in &last_lines {
        let trimmed = line.trim();
        if is_prompt_only(trimmed) {
            return ReadyOrBusy::Ready;
        }
        if line.contains(CURSOR_GLYPH) && is_prompt_with_text(trimmed) {
            return ReadyOrBusy::Ready;
        }
        let lower = line.to_lowercase();
        if READY_SUBSTRINGS.iter().any(|marker| lower.contains(marker)) {
            return ReadyOrBusy::Ready;
        }
    }
    ReadyOrBusy::Busy
}

fn is_prompt_only(trimmed: &str) -> bool {
    PROMPT_TOKENS.iter().any(|t| *t == trimmed)
}

fn is_prompt_with_text(trimmed: &str) -> bool {
    PROMPT_TOKENS.iter().any(|token| {
        trimmed
            .strip_prefix(token)
            .map(|rest| rest.starts_with(char::is_whitespace) && !rest.trim().is_empty())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_ready_markers() {
        assert_eq!(classify_capture("some output\nReady for your next instruction."), ReadyOrBusy::Ready);
        assert_eq!(classify_capture("thinking...\n> "), ReadyOrBusy::Ready);
        assert_eq!(classify_capture("Tokens: 1200 context left"), ReadyOrBusy::Ready);
    }

    #[test]
    fn classifies_busy_when_no_marker_present() {
        assert_eq!(classify_capture("Compiling crate foo v0.1.0\nCompiling crate bar v0.2.0"), ReadyOrBusy::Busy);
    }

    #[test]
    fn prompt_with_text_requires_cursor_glyph() {
        assert_eq!(classify_capture("> half-typed command"), ReadyOrBusy::Busy);
        assert_eq!(classify_capture(&format!("> half-typed {CURSOR_GLYPH}command")), ReadyOrBusy::Ready);
    }
}
