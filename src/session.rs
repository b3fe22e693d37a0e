//! Session Coordinator — all interaction with tmux (spec.md §4.5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ansi::overlay_cursor;
use crate::config::windows::WindowSpec;
use crate::error::SproutResult;
use crate::naming;
use crate::process::{self, RunOptions};

const MAX_CAPTURE_LINES: usize = 120;

pub struct SessionCoordinator {
    /// Last requested `(w, h)` per pane target, so unchanged resizes are
    /// never re-issued (spec.md §4.5).
    last_size: Mutex<HashMap<String, (u16, u16)>>,
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self { last_size: Mutex::new(HashMap::new()) }
    }
}

fn tmux(args: &[String]) -> SproutResult<String> {
    process::run_captured("tmux", args, &RunOptions::new())
}

fn a(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available() -> bool {
        which("tmux")
    }

    pub fn session_exists(&self, session: &str) -> bool {
        tmux(&a(&["has-session", "-t", session])).is_ok()
    }

    pub fn window_exists(&self, session: &str, window: &str) -> bool {
        let target = format!("{session}:{window}");
        tmux(&["list-windows".to_string(), "-t".to_string(), target]).is_ok()
    }

    /// Idempotent session creation. The initial window is named `window`
    /// so every caller's deterministic window name is reachable from the
    /// moment the session exists, instead of drifting under tmux
    /// automatic-rename. `remain-on-exit` is set on that window when
    /// `start_command` is not an interactive shell, so the operator can
    /// read a failing command's output.
    pub fn ensure_session(
        &self,
        session: &str,
        window: &str,
        cwd: &Path,
        start_command: Option<&str>,
    ) -> SproutResult<()> {
        if self.session_exists(session) {
            return Ok(());
        }
        let mut args = a(&["new-session", "-d", "-s", session, "-n", window, "-c"]);
        args.push(cwd.to_string_lossy().into_owned());
        if let Some(cmd) = start_command {
            args.push(cmd.to_string());
        }
        tmux(&args)?;

        if start_command.is_some() && !is_interactive_shell(start_command.unwrap()) {
            self.set_remain_on_exit(&format!("{session}:{window}"))?;
        }
        Ok(())
    }

    /// Idempotent window creation inside an already-existing session.
    pub fn ensure_window(&self, session: &str, window: &str, cwd: &Path, command: &str) -> SproutResult<()> {
        if self.window_exists(session, window) {
            return Ok(());
        }
        let target = format!("{session}:");
        tmux(&[
            "new-window".to_string(),
            "-d".to_string(),
            "-t".to_string(),
            target,
            "-n".to_string(),
            window.to_string(),
            "-c".to_string(),
            cwd.to_string_lossy().into_owned(),
            command.to_string(),
        ])?;

        if !is_interactive_shell(command) {
            self.set_remain_on_exit(&format!("{session}:{window}"))?;
        }
        Ok(())
    }

    fn set_remain_on_exit(&self, target: &str) -> SproutResult<()> {
        tmux(&[
            "set-window-option".to_string(),
            "-t".to_string(),
            target.to_string(),
            "remain-on-exit".to_string(),
            "on".to_string(),
        ])
        .map(|_| ())
    }

    /// `select-window`, then `switch-client` if already attached inside
    /// tmux, or `attach-session` (blocking, inherits the TTY) if
    /// `attach_outside` is requested.
    pub fn focus(&self, session: &str, window: &str, attach_outside: bool) -> SproutResult<()> {
        let target = format!("{session}:{window}");
        tmux(&["select-window".to_string(), "-t".to_string(), target.clone()])?;

        if inside_tmux() {
            tmux(&["switch-client".to_string(), "-t".to_string(), session.to_string()])?;
        } else if attach_outside {
            process::run_inherit_tty(
                "tmux",
                &["attach-session".to_string(), "-t".to_string(), session.to_string()],
                None,
            )?;
        }
        Ok(())
    }

    pub fn kill_session(&self, session: &str) -> SproutResult<()> {
        if !self.session_exists(session) {
            return Ok(());
        }
        tmux(&["kill-session".to_string(), "-t".to_string(), session.to_string()]).map(|_| ())
    }

    pub fn kill_window(&self, session: &str, window: &str) -> SproutResult<()> {
        let target = format!("{session}:{window}");
        if !self.window_exists(session, window) {
            return Ok(());
        }
        tmux(&["kill-window".to_string(), "-t".to_string(), target]).map(|_| ())
    }

    /// Capture the pane's scrollback + visible screen (up to `requested`
    /// lines, floored at the pane height, capped at 120), overlaying the
    /// cursor glyph when the terminal reports it visible.
    pub fn capture_with_cursor(&self, pane_target: &str, requested: usize) -> SproutResult<String> {
        let info = tmux(&[
            "display-message".to_string(),
            "-p".to_string(),
            "-t".to_string(),
            pane_target.to_string(),
            "#{cursor_flag} #{cursor_x} #{cursor_y} #{pane_height}".to_string(),
        ])?;
        let mut parts = info.trim().split_whitespace();
        let cursor_visible: bool = parts.next().map(|s| s == "1").unwrap_or(false);
        let cursor_x: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let cursor_y: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let pane_height: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(requested);

        let lines = requested.max(pane_height).min(MAX_CAPTURE_LINES);
        let capture = tmux(&[
            "capture-pane".to_string(),
            "-p".to_string(),
            "-e".to_string(),
            "-t".to_string(),
            pane_target.to_string(),
            "-S".to_string(),
            format!("-{lines}"),
        ])?;

        if !cursor_visible {
            return Ok(capture);
        }

        let screen_start = capture.lines().count().saturating_sub(pane_height);
        Ok(overlay_cursor(&capture, cursor_x, screen_start + cursor_y))
    }

    pub fn send_keys_raw(&self, pane_target: &str, keys: &str) -> SproutResult<()> {
        tmux(&["send-keys".to_string(), "-t".to_string(), pane_target.to_string(), keys.to_string()])
            .map(|_| ())
    }

    /// Send a literal line followed by Enter: `-l` (literal) then the
    /// Enter keysym separately, so shell-special characters in `line`
    /// aren't interpreted by tmux's key-name parser.
    pub fn send_line(&self, pane_target: &str, line: &str) -> SproutResult<()> {
        tmux(&[
            "send-keys".to_string(),
            "-t".to_string(),
            pane_target.to_string(),
            "-l".to_string(),
            line.to_string(),
        ])?;
        tmux(&["send-keys".to_string(), "-t".to_string(), pane_target.to_string(), "Enter".to_string()])
            .map(|_| ())
    }

    pub fn resize_pane(&self, pane_target: &str, width: u16, height: u16) -> SproutResult<()> {
        let mut memo = self.last_size.lock().unwrap();
        if memo.get(pane_target) == Some(&(width, height)) {
            return Ok(());
        }
        tmux(&[
            "resize-pane".to_string(),
            "-t".to_string(),
            pane_target.to_string(),
            "-x".to_string(),
            width.to_string(),
            "-y".to_string(),
            height.to_string(),
        ])?;
        memo.insert(pane_target.to_string(), (width, height));
        Ok(())
    }

    /// Find the pane index within `session:window` whose
    /// `pane_current_command` equals `command_name`.
    pub fn pane_index_by_command(&self, session: &str, window: &str, command_name: &str) -> SproutResult<Option<usize>> {
        let target = format!("{session}:{window}");
        let out = tmux(&[
            "list-panes".to_string(),
            "-t".to_string(),
            target,
            "-F".to_string(),
            "#{pane_index} #{pane_current_command}".to_string(),
        ])?;
        for line in out.lines() {
            let mut parts = line.splitn(2, ' ');
            let idx = parts.next().and_then(|s| s.parse::<usize>().ok());
            let cmd = parts.next().unwrap_or("");
            if cmd == command_name {
                return Ok(idx);
            }
        }
        Ok(None)
    }
}

fn is_interactive_shell(command: &str) -> bool {
    command.trim().is_empty()
        || matches!(
            command.trim(),
            "bash" | "zsh" | "sh" | "fish" | "$SHELL"
        )
}

pub fn inside_tmux() -> bool {
    std::env::var("TMUX").map(|v| !v.is_empty()).unwrap_or(false)
}

pub(crate) fn which(bin: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(bin).is_file())
        })
        .unwrap_or(false)
}

/// Resolve a pane working directory per spec.md §4.5: `""` → worktree
/// root, `~`/`~/...` → home expansion, `{worktree}`/`{worktree}/...` →
/// worktree root + remainder, otherwise pass through.
pub fn resolve_pane_dir(dir: &str, worktree_root: &Path) -> PathBuf {
    if dir.is_empty() {
        return worktree_root.to_path_buf();
    }
    if dir == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = dir.strip_prefix("~/") {
        return dirs::home_dir().map(|h| h.join(rest)).unwrap_or_else(|| PathBuf::from(dir));
    }
    if dir == "{worktree}" {
        return worktree_root.to_path_buf();
    }
    if let Some(rest) = dir.strip_prefix("{worktree}/") {
        return worktree_root.join(rest);
    }
    PathBuf::from(dir)
}

/// Build a session from a structured `[[windows]]` list: first pane of
/// each window becomes pane 0, subsequent panes are splits, then the
/// layout hint (or `even-horizontal` default for multi-pane windows) is
/// applied.
pub fn build_session_from_structured_windows(
    coordinator: &SessionCoordinator,
    session: &str,
    worktree_root: &Path,
    specs: &[WindowSpec],
) -> SproutResult<()> {
    let mut window_names: Vec<String> = Vec::new();
    for spec in specs {
        let name = naming::dedupe_name(&truncate(&spec.name, 60), &window_names);
        window_names.push(name.clone());

        let Some(first_pane) = spec.panes.first() else { continue };
        let first_dir = resolve_pane_dir(&first_pane.dir, worktree_root);

        if !coordinator.session_exists(session) {
            coordinator.ensure_session(session, &name, &first_dir, Some(&first_pane.run))?;
        } else {
            coordinator.ensure_window(session, &name, &first_dir, &first_pane.run)?;
        }

        for pane in spec.panes.iter().skip(1) {
            let dir = resolve_pane_dir(&pane.dir, worktree_root);
            let target = format!("{session}:{name}");
            tmux(&[
                "split-window".to_string(),
                "-t".to_string(),
                target,
                "-c".to_string(),
                dir.to_string_lossy().into_owned(),
                pane.run.clone(),
            ])?;
        }

        let layout = spec
            .layout
            .clone()
            .unwrap_or_else(|| if spec.panes.len() > 1 { "even-horizontal".to_string() } else { String::new() });
        if !layout.is_empty() {
            let target = format!("{session}:{name}");
            tmux(&["select-layout".to_string(), "-t".to_string(), target, layout]).map(|_| ())?;
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_pane_dir_variants() {
        let root = Path::new("/repo/worktrees/feat-x");
        assert_eq!(resolve_pane_dir("", root), root);
        assert_eq!(resolve_pane_dir("{worktree}", root), root);
        assert_eq!(resolve_pane_dir("{worktree}/scripts", root), root.join("scripts"));
        assert_eq!(resolve_pane_dir("/tmp/elsewhere", root), PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn interactive_shell_detection() {
        assert!(is_interactive_shell(""));
        assert!(is_interactive_shell("zsh"));
        assert!(!is_interactive_shell("nvim ."));
    }
}
