//! Dashboard contract stub (spec.md §1: "the dashboard's concrete widget
//! tree and keymap" is out of scope; only its contract with the core is
//! specified here). This module exposes the probe operations a future
//! interactive renderer would poll at sub-second cadence, plus the
//! transient-cache shape spec.md §3 describes, without owning a UI thread.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::SproutResult;
use crate::orchestrator::{Orchestrator, WorktreeRecord};
use crate::repo::DiffFileEntry;

const CACHE_TTL: Duration = Duration::from_secs(5);
const CACHE_CAP: usize = 256;

/// One dashboard-owned, single-thread cache entry. Entries expire by TTL
/// or are dropped wholesale once the map exceeds [`CACHE_CAP`] (spec.md
/// §3: "entries expire by TTL or by an LRU-style bulk-discard ... Caches
/// are invalidated wholesale on refresh").
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// Transient, UI-thread-owned caches keyed by worktree path. Never shared
/// across threads; background probes post results back through a command
/// queue owned by whatever eventually drives this (spec.md §9: "funnel
/// all mutations through the UI task").
#[derive(Default)]
pub struct DashboardCache {
    diff_files: HashMap<PathBuf, CacheEntry<Vec<DiffFileEntry>>>,
    last_agent_output: HashMap<PathBuf, CacheEntry<String>>,
}

impl DashboardCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_fresh<T>(entry: &CacheEntry<T>) -> bool {
        entry.fetched_at.elapsed() < CACHE_TTL
    }

    pub fn cached_diff_files(&self, path: &PathBuf) -> Option<&[DiffFileEntry]> {
        self.diff_files.get(path).filter(|e| Self::is_fresh(e)).map(|e| e.value.as_slice())
    }

    pub fn store_diff_files(&mut self, path: PathBuf, files: Vec<DiffFileEntry>) {
        if self.diff_files.len() >= CACHE_CAP {
            self.diff_files.clear();
        }
        self.diff_files.insert(path, CacheEntry { value: files, fetched_at: Instant::now() });
    }

    pub fn cached_agent_output(&self, path: &PathBuf) -> Option<&str> {
        self.last_agent_output.get(path).filter(|e| Self::is_fresh(e)).map(|e| e.value.as_str())
    }

    pub fn store_agent_output(&mut self, path: PathBuf, output: String) {
        if self.last_agent_output.len() >= CACHE_CAP {
            self.last_agent_output.clear();
        }
        self.last_agent_output.insert(path, CacheEntry { value: output, fetched_at: Instant::now() });
    }

    /// Invalidate everything, e.g. after a refresh keystroke.
    pub fn invalidate_all(&mut self) {
        self.diff_files.clear();
        self.last_agent_output.clear();
    }
}

/// The set of read-only probes a renderer's ticker would call each tick.
/// Holds only a borrow of the Orchestrator for the duration of a call, per
/// spec.md §9 ("the dashboard only holds a borrow of the Orchestrator for
/// the duration of a call ... Do not let the Orchestrator know about the
/// dashboard").
pub struct DashboardProbe<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> DashboardProbe<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn refresh_worktrees(&self) -> SproutResult<Vec<WorktreeRecord>> {
        self.orchestrator.list_worktrees()
    }

    pub fn agent_output(&self, target: &str, lines: usize) -> SproutResult<String> {
        self.orchestrator.agent_output(target, lines)
    }

    pub fn diff_files(&self, worktree_path: &std::path::Path) -> SproutResult<Vec<DiffFileEntry>> {
        self.orchestrator.repo.diff_file_list(worktree_path)
    }
}
