//! Calendar scheduling: find a free slot for an item and book it.
//!
//! - [`slots`]: pure slot arithmetic over merged busy ranges
//! - [`session`]: the propose / review / commit state machine
//! - [`client`]: the Google Calendar REST collaborator
//! - [`fetch`]: latest-only busy-time fetching

pub mod client;
pub mod fetch;
pub mod session;
pub mod slots;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

pub use client::{CalendarApi, EventRequest, GoogleCalendarClient};
pub use fetch::BusyFetcher;
pub use session::{ScheduledEvent, SchedulingSession, SessionState};
pub use slots::{
    default_start, first_available_start, is_conflicting, merge_busy_intervals, on_drag_adjust,
    snap_to_grid, BusyRange, CalendarEvent, DragKind, ProposedSlot, SchedulingWindow, SlotRounding,
};

/// Local wall time at `offset` to an instant.
pub fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    (local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// An instant to local wall time at `offset`.
pub fn utc_to_local(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    instant.with_timezone(&offset).naive_local()
}
