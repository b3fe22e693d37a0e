//! Error kinds shared across every component.
//!
//! The Process Runner is the single site that enriches raw OS errors with
//! context (argv, truncated output, timeout). Everything upstream converts
//! those into one of the domain variants below only when it can disambiguate
//! usefully; otherwise the raw [`SproutError::Vcs`]/[`SproutError::Session`]
//! bubbles straight up to the CLI.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SproutError {
    #[error("not inside a repository")]
    NotInRepo,

    #[error("no worktree matches {0:?}")]
    NotFound(String),

    #[error("invalid branch type {0:?} (expected one of feat, fix, chore, docs, refactor, test)")]
    InvalidBranchType(String),

    #[error("slug produced from {0:?} is empty")]
    EmptySlug(String),

    #[error("base branch {0:?} does not exist")]
    BaseBranchMissing(String),

    #[error("branch {0:?} already exists")]
    BranchAlreadyExists(String),

    #[error("target path {0:?} already exists")]
    TargetPathExists(PathBuf),

    #[error("worktree has uncommitted changes; pass --force to remove anyway")]
    DirtyWorktree,

    #[error("branch {0:?} is still checked out elsewhere")]
    BranchInUse(String),

    #[error("`{0}` failed (exit {1}): {2}")]
    VcsFailure(String, i32, String),

    #[error("`{0}` timed out after {1:?}")]
    SubprocessTimeout(String, Duration),

    #[error("failed to copy {0:?}: {1}")]
    CopyFailure(PathBuf, String),

    #[error("tmux error: {0}")]
    SessionFailure(String),

    #[error("required tool {0:?} is not on PATH")]
    ToolMissing(String),

    #[error("failed to parse config {file}:{line}: {message}")]
    ConfigParse {
        file: PathBuf,
        line: usize,
        message: String,
    },
}

pub type SproutResult<T> = Result<T, SproutError>;
