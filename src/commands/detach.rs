//! `sprout detach` — kill a working copy's session (spec.md §6, S4).

use anyhow::Result;
use console::style;

use super::build_orchestrator;

pub struct DetachArgs {
    pub target: String,
}

pub fn execute(args: DetachArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let (path, was_alive) = orchestrator.detach(&args.target)?;

    if was_alive {
        println!("{} detached {}", style("✓").green(), path.display());
    } else {
        println!("{} no session was running for {}", style("ℹ").blue(), path.display());
    }
    Ok(())
}
