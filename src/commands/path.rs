//! `sprout path` — print the absolute path of a working copy (spec.md §6).

use anyhow::Result;

use super::build_orchestrator;

pub struct PathArgs {
    pub target: String,
}

pub fn execute(args: PathArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let entry = orchestrator.find_worktree(&args.target)?;
    println!("{}", entry.path.display());
    Ok(())
}
