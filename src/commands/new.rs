//! `sprout new` — create a working copy (spec.md §6, §4.6 NewWorktree).

use anyhow::{bail, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::copier::Phase;
use crate::orchestrator::{BranchSource, NewWorktreeOpts};

use super::{build_orchestrator, print_path_with_cd_marker};

pub struct NewArgs {
    pub branch_type: Option<String>,
    pub name: Option<String>,
    pub from_branch: Option<String>,
    pub from: Option<String>,
    pub no_launch: bool,
}

pub fn execute(args: NewArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;

    let source = match (&args.from_branch, &args.branch_type, &args.name) {
        (Some(branch), _, _) => BranchSource::FromBranch(branch.clone()),
        (None, Some(branch_type), Some(name)) => BranchSource::TypeAndName(branch_type.clone(), name.clone()),
        _ => bail!("usage: sprout new <type> <name> | sprout new --from-branch <ref>"),
    };

    let opts = NewWorktreeOpts {
        source,
        base_branch: args.from.clone(),
        launch: !args.no_launch,
        skip_copy_untracked: false,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = std::thread::spawn(move || orchestrator.new_worktree(opts, |p| { let _ = tx.send(p); }));

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len} files")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for progress in rx {
        bar.set_length(progress.files_total.max(1));
        bar.set_position(progress.files_done);
        bar.set_message(match progress.phase {
            Phase::Scan => "scanning untracked files",
            Phase::Act => "copying untracked files",
        });
    }
    bar.finish_and_clear();

    match handle.join() {
        Ok(Ok(path)) => {
            println!("{} worktree ready", style("✓").green());
            let emit_marker = std::env::var("SPROUT_EMIT_CD_MARKER").map(|v| v == "1").unwrap_or(false);
            print_path_with_cd_marker(&path, emit_marker);
            Ok(())
        }
        Ok(Err(e)) => {
            println!("{} {e}", style("✗").red());
            Err(e.into())
        }
        Err(_) => bail!("worker thread panicked"),
    }
}
