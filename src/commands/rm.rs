//! `sprout rm` — remove a working copy (spec.md §6, S6).

use anyhow::Result;
use console::style;

use crate::orchestrator::RemoveOpts;

use super::build_orchestrator;

pub struct RmArgs {
    pub target: String,
    pub force: bool,
    pub delete_branch: bool,
}

pub fn execute(args: RmArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let (path, warnings) =
        orchestrator.remove(RemoveOpts { target: args.target, force: args.force, delete_branch: args.delete_branch })?;

    println!("{} removed {}", style("✓").green(), path.display());
    for warning in warnings {
        println!("{} {warning}", style("⚠").yellow());
    }
    Ok(())
}
