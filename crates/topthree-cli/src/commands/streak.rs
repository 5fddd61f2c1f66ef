use serde_json::json;

use super::{open_planner, print_json, CliResult};

pub fn summary() -> CliResult {
    let mut planner = open_planner(true)?;
    let summary = planner.streak_summary()?;
    print_json(&json!({
        "summary": summary,
        "risk_message": summary.risk.message(),
    }))
}

pub fn freeze() -> CliResult {
    let mut planner = open_planner(true)?;
    let remaining = planner.use_freeze_token()?;
    println!("freeze token used; {remaining} left");
    Ok(())
}
