//! Sprout CLI — fans a repository out into concurrently-live working
//! copies, each backed by a terminal multiplexer session.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use sprout::commands::{agent, detach, doctor, go, launch, list, new, path, rm, shell_hook, version};

#[derive(Parser)]
#[command(name = "sprout")]
#[command(about = "Fan a repository out into concurrently-live worktrees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive dashboard
    Ui,

    /// Create a new working copy
    New {
        /// Branch type: feat, fix, chore, docs, refactor, test
        branch_type: Option<String>,
        /// Human title, slugified into the branch name
        name: Option<String>,
        /// Check out an existing branch instead of creating one
        #[arg(long = "from-branch")]
        from_branch: Option<String>,
        /// Base branch/ref for a new branch (defaults per spec.md §4.3)
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        no_launch: bool,
    },

    /// Print all working copies
    List {
        #[arg(long)]
        json: bool,
    },

    /// Switch / focus a working copy
    Go {
        target: String,
        #[arg(long)]
        attach: bool,
        #[arg(long)]
        no_launch: bool,
    },

    /// Print a working copy's absolute path
    Path { target: String },

    /// Ensure a session exists for a working copy
    Launch {
        target: String,
        #[arg(long)]
        no_attach: bool,
    },

    /// Kill a working copy's session
    Detach { target: String },

    /// Manage the agent window
    Agent {
        #[command(subcommand)]
        action: AgentSubcommand,
    },

    /// Remove a working copy
    Rm {
        target: String,
        #[arg(long)]
        force: bool,
        #[arg(long = "delete-branch")]
        delete_branch: bool,
    },

    /// Health check
    Doctor {
        #[arg(long)]
        json: bool,
    },

    /// Print the shell integration script
    ShellHook {
        /// zsh, bash, or fish
        shell: String,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum AgentSubcommand {
    Start {
        target: String,
        #[arg(long)]
        attach: bool,
    },
    Stop {
        target: String,
    },
    Attach {
        target: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Ui) {
        Commands::Ui => run_ui(),
        Commands::New { branch_type, name, from_branch, from, no_launch } => {
            new::execute(new::NewArgs { branch_type, name, from_branch, from, no_launch })
        }
        Commands::List { json } => list::execute(list::ListArgs { json }),
        Commands::Go { target, attach, no_launch } => go::execute(go::GoArgs { target, attach, no_launch }),
        Commands::Path { target } => path::execute(path::PathArgs { target }),
        Commands::Launch { target, no_attach } => launch::execute(launch::LaunchArgs { target, no_attach }),
        Commands::Detach { target } => detach::execute(detach::DetachArgs { target }),
        Commands::Agent { action } => agent::execute(match action {
            AgentSubcommand::Start { target, attach } => agent::AgentAction::Start { target, attach },
            AgentSubcommand::Stop { target } => agent::AgentAction::Stop { target },
            AgentSubcommand::Attach { target } => agent::AgentAction::Attach { target },
        }),
        Commands::Rm { target, force, delete_branch } => rm::execute(rm::RmArgs { target, force, delete_branch }),
        Commands::Doctor { json } => doctor::execute(doctor::DoctorArgs { json }),
        Commands::ShellHook { shell } => shell_hook::execute(&shell),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

/// The dashboard's widget tree and keymap are out of core scope (spec.md
/// §1); this renders one static snapshot instead of an interactive loop.
fn run_ui() -> Result<()> {
    println!("sprout: interactive dashboard is not built into this binary; showing a one-shot snapshot.\n");
    list::execute(list::ListArgs { json: false })
}
