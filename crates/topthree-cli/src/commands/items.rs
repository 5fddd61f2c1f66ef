//! Item commands: add, list, move, rank, complete, edit, repair.

use serde_json::json;
use topthree_core::DaySlot;

use super::{open_planner, parse_day, print_json, CliResult};

pub fn add(title: &str, day: Option<&str>, today: bool, tomorrow: bool) -> CliResult {
    let mut planner = open_planner(true)?;
    let slot = if today {
        DaySlot::AssignedTo(planner.today())
    } else if tomorrow {
        DaySlot::AssignedTo(planner.tomorrow()?)
    } else if let Some(day) = day {
        DaySlot::AssignedTo(parse_day(&planner, day)?)
    } else {
        DaySlot::Backlog
    };
    let item = planner.add_item(title, slot)?;
    print_json(&item)
}

pub fn list(day: Option<&str>, backlog: bool) -> CliResult {
    let planner = open_planner(true)?;
    if backlog {
        return print_json(&planner.backlog()?);
    }
    let day = match day {
        Some(day) => parse_day(&planner, day)?,
        None => planner.today(),
    };
    let items = planner.items_for_day(day)?;
    print_json(&json!({ "day": day, "items": items }))
}

pub fn move_to_day(id: &str, day: &str) -> CliResult {
    let mut planner = open_planner(true)?;
    let day = parse_day(&planner, day)?;
    let outcome = planner.move_to_day(id, day)?;
    print_json(&outcome.item)
}

pub fn move_to_backlog(id: &str) -> CliResult {
    let mut planner = open_planner(true)?;
    print_json(&planner.move_to_backlog(id)?.item)
}

pub fn punt(id: &str) -> CliResult {
    let mut planner = open_planner(true)?;
    print_json(&planner.punt_to_tomorrow(id)?.item)
}

pub fn reorder(day: &str, ids: &[String]) -> CliResult {
    let mut planner = open_planner(true)?;
    let day = parse_day(&planner, day)?;
    if let Some(first) = ids.first() {
        let item_day = planner.get_item(first)?.day();
        if item_day != Some(day) {
            return Err(format!("item {first} is not assigned to {day}").into());
        }
    }
    planner.reorder(ids)?;
    let items = planner.items_for_day(day)?;
    print_json(&json!({ "day": day, "items": items }))
}

pub fn toggle(id: &str) -> CliResult {
    let mut planner = open_planner(true)?;
    print_json(&planner.toggle_completion(id)?)
}

pub fn delete(id: &str) -> CliResult {
    let mut planner = open_planner(true)?;
    let item = planner.delete_item(id)?;
    println!("deleted {}", item.id);
    Ok(())
}

pub fn rename(id: &str, title: &str) -> CliResult {
    let mut planner = open_planner(true)?;
    print_json(&planner.rename_item(id, title)?)
}

pub fn notes(id: &str, notes: Option<&str>) -> CliResult {
    let mut planner = open_planner(true)?;
    print_json(&planner.set_notes(id, notes)?)
}

pub fn repair() -> CliResult {
    let mut planner = open_planner(false)?;
    print_json(&planner.repair()?)
}

pub fn carry() -> CliResult {
    let mut planner = open_planner(false)?;
    print_json(&planner.carry_forward()?)
}
