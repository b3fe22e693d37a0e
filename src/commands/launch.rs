//! `sprout launch` — ensure a session exists for a working copy (spec.md §6).

use anyhow::Result;
use console::style;

use super::build_orchestrator;

pub struct LaunchArgs {
    pub target: String,
    pub no_attach: bool,
}

pub fn execute(args: LaunchArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let path = orchestrator.launch(&args.target, args.no_attach)?;
    println!("{} launched {}", style("✓").green(), path.display());
    Ok(())
}
