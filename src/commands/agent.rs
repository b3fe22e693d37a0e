//! `sprout agent start|stop|attach` — manage the agent window (spec.md §6).

use anyhow::Result;
use console::style;

use super::build_orchestrator;

pub enum AgentAction {
    Start { target: String, attach: bool },
    Stop { target: String },
    Attach { target: String },
}

pub fn execute(action: AgentAction) -> Result<()> {
    let orchestrator = build_orchestrator()?;

    match action {
        AgentAction::Start { target, attach } => {
            let (path, already_running) = orchestrator.start_agent(&target, attach)?;
            if already_running {
                println!("{} agent already running in {}", style("ℹ").blue(), path.display());
            } else {
                println!("{} agent started in {}", style("✓").green(), path.display());
            }
        }
        AgentAction::Stop { target } => {
            let (path, was_running) = orchestrator.stop_agent(&target)?;
            if was_running {
                println!("{} agent stopped in {}", style("✓").green(), path.display());
            } else {
                println!("{} agent was not running in {}", style("ℹ").blue(), path.display());
            }
        }
        AgentAction::Attach { target } => {
            let path = orchestrator.attach_agent(&target)?;
            println!("{} attached to agent in {}", style("✓").green(), path.display());
        }
    }
    Ok(())
}
