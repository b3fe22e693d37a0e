//! CLI command handlers. Each module owns one subcommand's argument struct
//! and its `execute()` entry point; all of them go through the
//! [`Orchestrator`] and nothing else.

pub mod agent;
pub mod detach;
pub mod doctor;
pub mod go;
pub mod launch;
pub mod list;
pub mod new;
pub mod path;
pub mod rm;
pub mod shell_hook;
pub mod version;

use anyhow::Result;

use crate::config::Configuration;
use crate::orchestrator::Orchestrator;
use crate::repo::RepositoryGateway;

/// Build an Orchestrator for the repository containing the current
/// directory, with a fully layered Configuration.
pub fn build_orchestrator() -> Result<Orchestrator> {
    let cwd = std::env::current_dir()?;
    let config = Configuration::load(&cwd)?;
    crate::process::set_debug_log_path(config.debug_log_path.as_deref());
    let repo = RepositoryGateway::discover(&cwd)?;
    Ok(Orchestrator::new(config, repo))
}

/// Emit the `go`/`new` stdout contract: the path as the last non-marker
/// line, plus a `__SPROUT_CD__=<path>` marker line when the env var is set
/// (spec.md §6).
pub fn print_path_with_cd_marker(path: &std::path::Path, emit_marker: bool) {
    if emit_marker {
        println!("__SPROUT_CD__={}", path.display());
    }
    println!("{}", path.display());
}
