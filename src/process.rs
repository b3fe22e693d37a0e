//! Process Runner — the single gateway to every external binary invocation.
//!
//! Every other component (Repository Gateway, Tree Copier, Session
//! Coordinator) spawns subprocesses exclusively through [`ProcessRunner`] so
//! that timeout handling, logging and error enrichment stay uniform, per the
//! re-architecture guidance in spec.md §9 ("prefer a single wrapper type").

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::error::{SproutError, SproutResult};

const MAX_ERROR_BODY: usize = 600;

/// Process-wide debug log, guarded by one mutex — the only global mutable
/// state this crate carries (spec.md §9).
static DEBUG_LOG: OnceLock<Mutex<Option<File>>> = OnceLock::new();

fn debug_log() -> &'static Mutex<Option<File>> {
    DEBUG_LOG.get_or_init(|| Mutex::new(None))
}

/// Re-point (or disable, with `None`) the debug log. Call once at startup
/// from the resolved [`crate::config::Configuration`].
pub fn set_debug_log_path(path: Option<&Path>) {
    let mut guard = debug_log().lock().unwrap();
    *guard = path.and_then(|p| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(p)
            .ok()
    });
}

fn log_line(line: &str) {
    let mut guard = debug_log().lock().unwrap();
    if let Some(file) = guard.as_mut() {
        let _ = writeln!(file, "{line}");
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<Vec<u8>>,
    pub allowed_exit_codes: HashSet<i32>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn allow_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.allowed_exit_codes.extend(codes);
        self
    }
}

/// A single external binary invocation, captured for logging/enrichment.
fn argv_string(program: &str, args: &[String]) -> String {
    let mut s = program.to_string();
    for a in args {
        s.push(' ');
        s.push_str(a);
    }
    s
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &body[..cut])
    }
}

/// Run `program args...` and capture stdout+stderr combined (stderr is
/// redirected into the same pipe as stdout so ordering is preserved as
/// closely as the OS allows).
pub fn run_captured(program: &str, args: &[String], opts: &RunOptions) -> SproutResult<String> {
    run_inner(program, args, opts, false)
}

/// Same as [`run_captured`], but uninterruptible: inherits the controlling
/// terminal so the child can take over the screen. No capture, no timeout.
/// Used only for `tmux attach-session`.
pub fn run_inherit_tty(program: &str, args: &[String], cwd: Option<&Path>) -> SproutResult<()> {
    let argv = argv_string(program, args);
    log_line(&format!("[run-tty] {argv}"));

    let mut cmd = std::process::Command::new(program);
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let status = cmd
        .status()
        .map_err(|e| SproutError::VcsFailure(argv.clone(), -1, e.to_string()))?;

    if status.success() {
        Ok(())
    } else {
        Err(SproutError::VcsFailure(
            argv,
            status.code().unwrap_or(-1),
            String::new(),
        ))
    }
}

fn run_inner(
    program: &str,
    args: &[String],
    opts: &RunOptions,
    _reserved: bool,
) -> SproutResult<String> {
    let argv = argv_string(program, args);
    let start = Instant::now();
    tracing::debug!(argv = %argv, "spawning");

    let mut cmd = std::process::Command::new(program);
    cmd.args(args);
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(if opts.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| SproutError::VcsFailure(argv.clone(), -1, e.to_string()))?;

    if let Some(bytes) = &opts.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(bytes);
        }
    }

    let output = match opts.timeout {
        None => child
            .wait_with_output()
            .map_err(|e| SproutError::VcsFailure(argv.clone(), -1, e.to_string()))?,
        Some(timeout) => wait_with_timeout(child, timeout, &argv)?,
    };

    let elapsed = start.elapsed();
    let combined = merge_output(&output.stdout, &output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);

    if output.status.success() || opts.allowed_exit_codes.contains(&exit_code) {
        log_line(&format!(
            "[ok {:?}] {argv} ({} bytes)",
            elapsed,
            combined.len()
        ));
        Ok(combined)
    } else {
        let truncated = truncate_body(&combined);
        log_line(&format!(
            "[err {:?}] {argv} -> exit {exit_code}: {truncated}"
        ));
        Err(SproutError::VcsFailure(argv, exit_code, truncated))
    }
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&err);
    }
    combined
}

fn wait_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
    argv: &str,
) -> SproutResult<std::process::Output> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_status)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| SproutError::VcsFailure(argv.to_string(), -1, e.to_string()));
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    log_line(&format!("[timeout {timeout:?}] {argv}"));
                    return Err(SproutError::SubprocessTimeout(argv.to_string(), timeout));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                return Err(SproutError::VcsFailure(argv.to_string(), -1, e.to_string()));
            }
        }
    }
}

/// Default timeout for `git worktree add`/`remove`: 45s, clamped [5, 600],
/// overridable via `SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS`.
pub fn worktree_timeout() -> Duration {
    let seconds = std::env::var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(45)
        .clamp(5, 600);
    Duration::from_secs(seconds)
}

/// Substrings that indicate a `worktree add`/`remove` failure is the
/// well-known stale-metadata race, worth retrying once after a prune.
pub const ADD_RETRY_SUBSTRINGS: &[&str] = &[
    "timeout",
    "already checked out",
    "already exists",
    "already registered",
    "cannot lock",
    "cannot create",
];

pub const REMOVE_RETRY_SUBSTRINGS: &[&str] = &["is locked", "cannot remove", "cannot lock"];

pub fn matches_retry_substring(message: &str, substrings: &[&str]) -> bool {
    let lower = message.to_lowercase();
    substrings.iter().any(|s| lower.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_bodies_with_ellipsis() {
        let body = "x".repeat(1000);
        let truncated = truncate_body(&body);
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(truncate_body("hello"), "hello");
    }

    #[test]
    fn retry_substrings_match_case_insensitively() {
        assert!(matches_retry_substring(
            "fatal: already exists",
            ADD_RETRY_SUBSTRINGS
        ));
        assert!(matches_retry_substring(
            "Already Checked Out",
            ADD_RETRY_SUBSTRINGS
        ));
        assert!(!matches_retry_substring(
            "completely unrelated failure",
            ADD_RETRY_SUBSTRINGS
        ));
    }

    #[test]
    fn run_captured_returns_stdout() {
        let out = run_captured("echo", &["hi".to_string()], &RunOptions::new()).unwrap();
        assert_eq!(out.trim(), "hi");
    }

    #[test]
    fn run_captured_propagates_nonzero_exit() {
        let err = run_captured("sh", &["-c".to_string(), "exit 3".to_string()], &RunOptions::new());
        assert!(err.is_err());
    }

    #[test]
    fn allowed_exit_codes_are_treated_as_success() {
        let opts = RunOptions::new().allow_exit_codes([1]);
        let out = run_captured("sh", &["-c".to_string(), "exit 1".to_string()], &opts).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn worktree_timeout_clamps_to_bounds() {
        std::env::set_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS", "2");
        assert_eq!(worktree_timeout(), Duration::from_secs(5));
        std::env::set_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS", "10000");
        assert_eq!(worktree_timeout(), Duration::from_secs(600));
        std::env::set_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS", "120");
        assert_eq!(worktree_timeout(), Duration::from_secs(120));
        std::env::remove_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS");
    }
}
