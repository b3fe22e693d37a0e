//! `sprout list` — print all working copies (spec.md §6).

use anyhow::Result;
use console::style;
use serde::Serialize;

use crate::orchestrator::{AgentState, TmuxState, WorktreeRecord};

use super::build_orchestrator;

pub struct ListArgs {
    pub json: bool,
}

#[derive(Serialize)]
struct JsonRecord {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Branch")]
    branch: String,
    #[serde(rename = "Current")]
    current: bool,
    #[serde(rename = "Dirty")]
    dirty: bool,
    #[serde(rename = "TmuxState")]
    tmux_state: String,
    #[serde(rename = "AgentState")]
    agent_state: String,
}

fn tmux_state_label(state: TmuxState) -> &'static str {
    match state {
        TmuxState::Alive => "alive",
        TmuxState::Dead => "dead",
        TmuxState::NotApplicable => "n/a",
    }
}

fn agent_state_label(state: AgentState) -> &'static str {
    match state {
        AgentState::Ready => "ready",
        AgentState::Busy => "busy",
        AgentState::Offline => "offline",
        AgentState::Running => "running",
        AgentState::NotApplicable => "n/a",
    }
}

pub fn execute(args: ListArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let records = orchestrator.list_worktrees()?;

    if args.json {
        let json_records: Vec<JsonRecord> = records.iter().map(to_json_record).collect();
        println!("{}", serde_json::to_string_pretty(&json_records)?);
        return Ok(());
    }

    print_table(&records);
    Ok(())
}

fn to_json_record(record: &WorktreeRecord) -> JsonRecord {
    JsonRecord {
        path: record.path.display().to_string(),
        branch: record.branch.clone(),
        current: record.current,
        dirty: record.dirty,
        tmux_state: tmux_state_label(record.tmux_state).to_string(),
        agent_state: agent_state_label(record.agent_state).to_string(),
    }
}

fn print_table(records: &[WorktreeRecord]) {
    let branch_width = records.iter().map(|r| r.branch.len()).max().unwrap_or(6).max(6);
    println!(
        "{:<1}  {:<width$}  {:<6}  {:<7}  {:<6}  PATH",
        " ",
        "BRANCH",
        "TMUX",
        "AGENT",
        "DIRTY",
        width = branch_width
    );
    for record in records {
        let marker = if record.current { style("*").green().to_string() } else { " ".to_string() };
        let dirty = if record.dirty { style("yes").yellow().to_string() } else { "no".to_string() };
        println!(
            "{}  {:<width$}  {:<6}  {:<7}  {:<6}  {}",
            marker,
            record.branch,
            tmux_state_label(record.tmux_state),
            agent_state_label(record.agent_state),
            dirty,
            record.path.display(),
            width = branch_width
        );
    }
}
