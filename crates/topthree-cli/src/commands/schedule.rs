//! `topthree schedule`: find a free slot on the item's day and book it.

use chrono::NaiveTime;
use serde_json::json;
use topthree_core::calendar::{BusyFetcher, GoogleCalendarClient};
use topthree_core::KeyringTokenProvider;

use super::{open_planner, print_json, CliResult};

pub fn run(id: &str, duration: Option<u32>, start: Option<&str>, dry_run: bool) -> CliResult {
    let mut planner = open_planner(true)?;
    let config = planner.config().clone();
    let duration = duration.unwrap_or(config.scheduling.default_duration_minutes);
    if duration == 0 {
        return Err("duration must be positive".into());
    }

    let mut session = planner.scheduling_session(id)?;
    let client = GoogleCalendarClient::new(&config.calendar, KeyringTokenProvider::new(&config.auth))?;
    let fetcher = BusyFetcher::new(client);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(planner.load_busy(&fetcher, &mut session))?;

    match start {
        Some(start) => {
            let time = NaiveTime::parse_from_str(start, "%H:%M")
                .map_err(|e| format!("invalid start '{start}' (expected HH:MM): {e}"))?;
            session.propose(session.window().day.and_time(time), duration);
        }
        None => {
            if session.propose_default(duration).is_none() {
                return Err(format!(
                    "no free {duration}-minute slot on {} between {} and {}",
                    session.window().day,
                    config.scheduling.work_start,
                    config.scheduling.work_end
                )
                .into());
            }
        }
    }

    if dry_run {
        return print_json(&json!({
            "state": session.state(),
            "events": session.events(),
        }));
    }

    let scheduled = runtime.block_on(planner.schedule(&mut session, fetcher.api()))?;
    print_json(&scheduled)
}
