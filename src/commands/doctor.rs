//! `sprout doctor` — health check (spec.md §6, §4.6 Doctor).

use anyhow::Result;
use console::style;
use serde::Serialize;

use crate::orchestrator::{CheckStatus, DoctorCheck};

use super::build_orchestrator;

pub struct DoctorArgs {
    pub json: bool,
}

#[derive(Serialize)]
struct JsonCheck {
    status: &'static str,
    subject: String,
}

pub fn execute(args: DoctorArgs) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let report = orchestrator.doctor();

    if args.json {
        let checks: Vec<JsonCheck> =
            report.checks.iter().map(|c| JsonCheck { status: status_label(c.status), subject: c.subject.clone() }).collect();
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        for check in &report.checks {
            println!("{} {}", glyph(check), check.subject);
        }
    }

    std::process::exit(report.exit_code);
}

fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Ok => "ok",
        CheckStatus::Warn => "warn",
        CheckStatus::Miss => "miss",
    }
}

fn glyph(check: &DoctorCheck) -> console::StyledObject<&'static str> {
    match check.status {
        CheckStatus::Ok => style("✓").green(),
        CheckStatus::Warn => style("⚠").yellow(),
        CheckStatus::Miss => style("✗").red(),
    }
}
