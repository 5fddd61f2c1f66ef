//! Free-slot arithmetic over a day's busy calendar ranges.
//!
//! Everything here is pure and synchronous and works in local wall time.
//! Intervals are half-open `[start, end)`: a range ending exactly when
//! another begins does not overlap it.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::SchedulingConfig;

/// An event fetched from the external calendar, in local wall time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// All-day events are shown but never block a slot.
    pub is_all_day: bool,
}

/// A merged, disjoint busy range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl BusyRange {
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRounding {
    Nearest,
    Ceiling,
}

/// Which handle the user is dragging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    /// Moves the whole block; duration is held.
    Move,
    /// Drags the end handle; start is held and duration recomputed.
    Resize,
}

/// A candidate block on the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedSlot {
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
}

impl ProposedSlot {
    pub fn new(start: NaiveDateTime, duration_minutes: u32) -> Self {
        Self {
            start,
            duration_minutes,
        }
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// The day being scheduled plus the bounds slots must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingWindow {
    pub day: NaiveDate,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub grid_minutes: u32,
    /// Local "now" when `day` is today; `None` for any other day.
    pub now: Option<NaiveDateTime>,
}

impl SchedulingWindow {
    pub fn for_day(
        day: NaiveDate,
        config: &SchedulingConfig,
        local_now: NaiveDateTime,
    ) -> Result<Self, ConfigError> {
        let (work_start, work_end) = config.work_window()?;
        Ok(Self {
            day,
            work_start,
            work_end,
            grid_minutes: config.grid_minutes.max(1),
            now: (local_now.date() == day).then_some(local_now),
        })
    }

    pub fn is_today(&self) -> bool {
        self.now.is_some()
    }

    pub fn start_of_day(&self) -> NaiveDateTime {
        self.day.and_time(NaiveTime::MIN)
    }

    /// Exclusive end of the day.
    pub fn end_of_day(&self) -> NaiveDateTime {
        self.start_of_day() + Duration::days(1)
    }

    pub fn work_start_at(&self) -> NaiveDateTime {
        self.day.and_time(self.work_start)
    }

    pub fn work_end_at(&self) -> NaiveDateTime {
        self.day.and_time(self.work_end)
    }

    /// Earliest start a user may pick: start of day, or now rounded up to
    /// the grid when scheduling today.
    pub fn floor(&self) -> NaiveDateTime {
        match self.now {
            Some(now) => snap_up(now, self.grid_minutes).max(self.start_of_day()),
            None => self.start_of_day(),
        }
    }

    fn grid(&self) -> Duration {
        Duration::minutes(i64::from(self.grid_minutes))
    }

    /// Last grid mark strictly before the end of the day.
    fn last_mark(&self) -> NaiveDateTime {
        self.end_of_day() - self.grid()
    }
}

/// Round `time` up to the next grid boundary; times already on a boundary
/// stay put.
pub fn snap_up(time: NaiveDateTime, grid_minutes: u32) -> NaiveDateTime {
    let grid = i64::from(grid_minutes.max(1));
    let base = time.date().and_time(NaiveTime::MIN);
    let minutes = i64::from(time.hour() * 60 + time.minute());
    let partial = time.second() > 0 || time.nanosecond() > 0;
    let mut snapped = (minutes / grid) * grid;
    if snapped < minutes || (snapped == minutes && partial) {
        snapped += grid;
    }
    base + Duration::minutes(snapped)
}

/// Drop all-day events, sort by start and coalesce ranges that touch or
/// overlap.
pub fn merge_busy_intervals(events: &[CalendarEvent]) -> Vec<BusyRange> {
    let mut timed: Vec<BusyRange> = events
        .iter()
        .filter(|e| !e.is_all_day && e.end > e.start)
        .map(|e| BusyRange {
            start: e.start,
            end: e.end,
        })
        .collect();
    timed.sort_by_key(|r| (r.start, r.end));

    let mut merged: Vec<BusyRange> = Vec::with_capacity(timed.len());
    for range in timed {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// First start at or after `max(earliest_allowed, work_start)` where
/// `duration_minutes` fits between busy ranges and before work end.
/// `None` means the day has no room.
pub fn first_available_start(
    window: &SchedulingWindow,
    duration_minutes: u32,
    busy: &[BusyRange],
    earliest_allowed: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let duration = Duration::minutes(i64::from(duration_minutes));
    let work_end = window.work_end_at();
    let mut candidate = earliest_allowed.max(window.work_start_at());

    for range in busy {
        if range.end <= candidate {
            continue;
        }
        if candidate + duration <= range.start {
            break;
        }
        candidate = candidate.max(snap_up(range.end, window.grid_minutes));
    }

    (candidate + duration <= work_end).then_some(candidate)
}

/// Initial proposal for a day: work start, or now rounded up when the
/// day is today, then the first gap from there.
pub fn default_start(
    window: &SchedulingWindow,
    duration_minutes: u32,
    busy: &[BusyRange],
) -> Option<NaiveDateTime> {
    let earliest = window.floor().max(window.work_start_at());
    first_available_start(window, duration_minutes, busy, earliest)
}

/// Round to the grid and clamp into `[floor, end of day)`.
pub fn snap_to_grid(
    window: &SchedulingWindow,
    time: NaiveDateTime,
    rounding: SlotRounding,
) -> NaiveDateTime {
    let grid = i64::from(window.grid_minutes);
    let offset = (time - window.start_of_day()).num_minutes();
    let within = time - window.start_of_day() - Duration::minutes(offset);
    let steps = match rounding {
        SlotRounding::Nearest => (offset + grid / 2).div_euclid(grid),
        SlotRounding::Ceiling => {
            let exact = offset.rem_euclid(grid) == 0 && within == Duration::zero();
            offset.div_euclid(grid) + i64::from(!exact)
        }
    };
    let snapped = window.start_of_day() + Duration::minutes(steps * grid);
    snapped.clamp(window.floor().min(window.last_mark()), window.last_mark())
}

/// True iff `[start, start + duration)` intersects any busy range.
pub fn is_conflicting(proposal: &ProposedSlot, busy: &[BusyRange]) -> bool {
    let end = proposal.end();
    busy.iter().any(|range| range.overlaps(proposal.start, end))
}

/// Apply a drag of `delta_minutes` to `current`, snapping and clamping so
/// the block stays inside the day.
pub fn on_drag_adjust(
    window: &SchedulingWindow,
    kind: DragKind,
    delta_minutes: i64,
    current: ProposedSlot,
) -> ProposedSlot {
    match kind {
        DragKind::Move => {
            let duration = Duration::minutes(i64::from(current.duration_minutes));
            let moved = snap_to_grid(
                window,
                current.start + Duration::minutes(delta_minutes),
                SlotRounding::Nearest,
            );
            let latest = (window.end_of_day() - duration).max(window.start_of_day());
            // Late today the block may not fit before midnight; the floor
            // wins and the block is cut at the end of the day.
            let start = moved.min(latest).max(window.floor());
            let room = (window.end_of_day() - start).num_minutes().max(0);
            let minutes = i64::from(current.duration_minutes).min(room);
            ProposedSlot::new(start, u32::try_from(minutes).unwrap_or(0))
        }
        DragKind::Resize => {
            let grid = i64::from(window.grid_minutes);
            let raw_end = current.end() + Duration::minutes(delta_minutes);
            let minutes = (raw_end - current.start).num_minutes();
            let snapped = ((minutes + grid / 2).div_euclid(grid) * grid).max(grid);
            let room = (window.end_of_day() - current.start).num_minutes();
            let duration = snapped.min(room).max(grid.min(room)).max(0);
            ProposedSlot::new(current.start, u32::try_from(duration).unwrap_or(u32::MAX))
        }
    }
}

/// Convert a pixel drag on a timeline into minutes.
pub fn minutes_for_pixels(pixels: f64, pixels_per_hour: f64) -> i64 {
    if pixels_per_hour <= 0.0 {
        return 0;
    }
    (pixels / pixels_per_hour * 60.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
    }

    fn at(hhmm: &str) -> NaiveDateTime {
        day().and_time(NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap())
    }

    fn window() -> SchedulingWindow {
        SchedulingWindow {
            day: day(),
            work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            work_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            grid_minutes: 15,
            now: None,
        }
    }

    fn event(start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: format!("{start}-{end}"),
            title: "busy".into(),
            start: at(start),
            end: at(end),
            is_all_day: false,
        }
    }

    fn range(start: &str, end: &str) -> BusyRange {
        BusyRange {
            start: at(start),
            end: at(end),
        }
    }

    #[test]
    fn merge_coalesces_touching_and_overlapping() {
        let mut all_day = event("00:00", "00:00");
        all_day.is_all_day = true;
        all_day.end = at("00:00") + Duration::days(1);
        let merged = merge_busy_intervals(&[
            event("10:00", "11:00"),
            event("09:00", "09:30"),
            event("09:30", "09:45"),
            event("10:30", "12:00"),
            all_day,
        ]);
        assert_eq!(merged, vec![range("09:00", "09:45"), range("10:00", "12:00")]);
    }

    #[test]
    fn first_start_uses_gap_before_first_busy_range() {
        let busy = [range("09:00", "09:30"), range("10:00", "11:00")];
        assert_eq!(
            first_available_start(&window(), 45, &busy, at("08:00")),
            Some(at("08:00"))
        );
    }

    #[test]
    fn first_start_skips_too_small_gaps() {
        let busy = [range("09:00", "09:30"), range("10:00", "11:00")];
        assert_eq!(
            first_available_start(&window(), 30, &busy, at("09:00")),
            Some(at("09:30"))
        );
        assert_eq!(
            first_available_start(&window(), 45, &busy, at("09:00")),
            Some(at("11:00"))
        );
    }

    #[test]
    fn first_start_snaps_after_ragged_range_end() {
        let busy = [range("08:00", "09:10")];
        assert_eq!(
            first_available_start(&window(), 30, &busy, at("08:00")),
            Some(at("09:15"))
        );
    }

    #[test]
    fn first_start_respects_work_window() {
        assert_eq!(
            first_available_start(&window(), 30, &[], at("06:00")),
            Some(at("08:00"))
        );
        let busy = [range("08:00", "21:45")];
        assert_eq!(first_available_start(&window(), 30, &busy, at("08:00")), None);
        assert_eq!(
            first_available_start(&window(), 15, &busy, at("08:00")),
            Some(at("21:45"))
        );
    }

    #[test]
    fn default_start_for_today_starts_after_now() {
        let mut w = window();
        w.now = Some(at("13:07"));
        let busy = [range("13:15", "14:00")];
        assert_eq!(default_start(&w, 30, &busy), Some(at("14:00")));
        assert_eq!(default_start(&window(), 30, &busy), Some(at("08:00")));
    }

    #[test]
    fn snapping_rounds_and_clamps() {
        let w = window();
        assert_eq!(snap_to_grid(&w, at("10:07"), SlotRounding::Nearest), at("10:00"));
        assert_eq!(snap_to_grid(&w, at("10:08"), SlotRounding::Nearest), at("10:15"));
        assert_eq!(snap_to_grid(&w, at("10:01"), SlotRounding::Ceiling), at("10:15"));
        assert_eq!(snap_to_grid(&w, at("10:15"), SlotRounding::Ceiling), at("10:15"));
        assert_eq!(snap_to_grid(&w, at("23:55"), SlotRounding::Ceiling), at("23:45"));
        assert_eq!(
            snap_to_grid(&w, at("00:00") - Duration::minutes(20), SlotRounding::Nearest),
            at("00:00")
        );
    }

    #[test]
    fn snapping_today_never_goes_into_the_past() {
        let mut w = window();
        w.now = Some(at("14:20"));
        assert_eq!(snap_to_grid(&w, at("09:00"), SlotRounding::Nearest), at("14:30"));
    }

    #[test]
    fn conflicts_are_half_open_and_symmetric() {
        let busy = [range("10:00", "11:00")];
        assert!(!is_conflicting(&ProposedSlot::new(at("09:30"), 30), &busy));
        assert!(!is_conflicting(&ProposedSlot::new(at("11:00"), 30), &busy));
        assert!(is_conflicting(&ProposedSlot::new(at("09:45"), 30), &busy));
        assert!(is_conflicting(&ProposedSlot::new(at("10:15"), 15), &busy));

        let a = range("09:00", "10:00");
        let b = range("09:30", "10:30");
        assert_eq!(a.overlaps(b.start, b.end), b.overlaps(a.start, a.end));
    }

    #[test]
    fn move_drag_keeps_duration() {
        let w = window();
        let moved = on_drag_adjust(&w, DragKind::Move, 50, ProposedSlot::new(at("10:00"), 45));
        assert_eq!(moved, ProposedSlot::new(at("10:45"), 45));

        let late = on_drag_adjust(&w, DragKind::Move, 600, ProposedSlot::new(at("20:00"), 60));
        assert_eq!(late, ProposedSlot::new(at("23:00"), 60));
    }

    #[test]
    fn late_move_today_stays_after_now_and_shrinks() {
        let mut w = window();
        w.now = Some(at("23:20"));
        let moved = on_drag_adjust(&w, DragKind::Move, 0, ProposedSlot::new(at("23:30"), 60));
        assert!(moved.start >= at("23:20"));
        assert_eq!(moved, ProposedSlot::new(at("23:30"), 30));
        assert_eq!(moved.end(), w.end_of_day());

        let dragged_back = on_drag_adjust(&w, DragKind::Move, -120, moved);
        assert_eq!(dragged_back.start, at("23:30"));
    }

    #[test]
    fn move_after_last_mark_today_leaves_no_room() {
        let mut w = window();
        w.now = Some(at("23:50"));
        let moved = on_drag_adjust(&w, DragKind::Move, 0, ProposedSlot::new(at("23:45"), 90));
        assert!(moved.start >= at("23:50"));
        assert_eq!(moved.duration_minutes, 0);
    }

    #[test]
    fn resize_drag_recomputes_duration() {
        let w = window();
        let grown = on_drag_adjust(&w, DragKind::Resize, 22, ProposedSlot::new(at("10:00"), 30));
        assert_eq!(grown, ProposedSlot::new(at("10:00"), 45));

        let shrunk = on_drag_adjust(&w, DragKind::Resize, -90, ProposedSlot::new(at("10:00"), 30));
        assert_eq!(shrunk, ProposedSlot::new(at("10:00"), 15));

        let capped = on_drag_adjust(&w, DragKind::Resize, 600, ProposedSlot::new(at("23:00"), 30));
        assert_eq!(capped.end(), w.end_of_day());
    }

    #[test]
    fn pixel_conversion() {
        assert_eq!(minutes_for_pixels(30.0, 60.0), 30);
        assert_eq!(minutes_for_pixels(-45.0, 90.0), -30);
        assert_eq!(minutes_for_pixels(10.0, 0.0), 0);
    }
}
