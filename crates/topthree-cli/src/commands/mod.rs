pub mod auth;
pub mod config;
pub mod items;
pub mod schedule;
pub mod streak;

use std::error::Error;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use topthree_core::{Config, Planner, SqliteStore, SystemClock};

pub type CliResult = Result<(), Box<dyn Error>>;

/// Open the on-disk planner. With `startup`, run the repair and
/// carry-forward passes first, as every app launch does.
pub fn open_planner(startup: bool) -> Result<Planner<SqliteStore>, Box<dyn Error>> {
    let config = Config::load()?;
    let clock = SystemClock::with_offset(config.calendar.offset()?);
    let store = SqliteStore::open()?;
    let mut planner = Planner::new(store, Arc::new(clock), config);
    if startup {
        let report = planner.startup();
        for error in &report.errors {
            tracing::warn!(%error, "startup pass failed");
        }
    }
    Ok(planner)
}

/// `today`, `tomorrow` or an ISO date.
pub fn parse_day(planner: &Planner<SqliteStore>, value: &str) -> Result<NaiveDate, Box<dyn Error>> {
    match value {
        "today" => Ok(planner.today()),
        "tomorrow" => Ok(planner.tomorrow()?),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .map_err(|e| format!("invalid day '{other}' (expected YYYY-MM-DD): {e}").into()),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
