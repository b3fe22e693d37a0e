//! `sprout go` — switch/focus a working copy (spec.md §6, §4.6 Go).

use anyhow::Result;

use crate::orchestrator::GoOpts;

use super::{build_orchestrator, print_path_with_cd_marker};

pub struct GoArgs {
    pub target: String,
    pub attach: bool,
    pub no_launch: bool,
}

pub fn execute(args: GoArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let path = orchestrator.go(GoOpts { target: args.target, attach: args.attach, launch: !args.no_launch })?;

    let emit_marker = std::env::var("SPROUT_EMIT_CD_MARKER").map(|v| v == "1").unwrap_or(false);
    print_path_with_cd_marker(&path, emit_marker);
    Ok(())
}
