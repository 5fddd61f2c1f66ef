//! One scheduling attempt for one item.
//!
//! ```text
//! Unscheduled --propose--> Reviewing --submit--> Committed
//!      ^                       |
//!      +-------cancel----------+
//! ```
//!
//! The conflict flag is recomputed on every proposal, drag and busy-time
//! refresh. Submitting while it is set is refused without contacting the
//! calendar.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::{CalendarApi, EventRequest};
use super::local_to_utc;
use super::slots::{
    default_start, is_conflicting, merge_busy_intervals, on_drag_adjust, BusyRange, CalendarEvent,
    DragKind, ProposedSlot, SchedulingWindow,
};
use crate::error::{CalendarError, ValidationError};
use crate::model::PriorityItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Unscheduled,
    Reviewing {
        proposal: ProposedSlot,
        conflicting: bool,
    },
    Committed {
        calendar_event_id: String,
        proposal: ProposedSlot,
    },
}

/// What a successful submit booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub item_id: String,
    pub calendar_event_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// An existing event was moved instead of a new one created.
    pub updated: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulingSession {
    item_id: String,
    title: String,
    existing_event_id: Option<String>,
    window: SchedulingWindow,
    events: Vec<CalendarEvent>,
    busy: Vec<BusyRange>,
    state: SessionState,
}

impl SchedulingSession {
    /// Start a session for `item` on `window.day`.
    ///
    /// # Errors
    /// Backlog items, or items assigned to a different day than the window.
    pub fn new(item: &PriorityItem, window: SchedulingWindow) -> Result<Self, ValidationError> {
        let day = item.day().ok_or(ValidationError::BacklogNotSchedulable)?;
        if day != window.day {
            return Err(ValidationError::InvalidValue {
                field: "day".into(),
                message: format!("item is assigned to {day}, not {}", window.day),
            });
        }
        Ok(Self {
            item_id: item.id.clone(),
            title: item.title.clone(),
            existing_event_id: item.calendar_event_id.clone(),
            window,
            events: Vec::new(),
            busy: Vec::new(),
            state: SessionState::Unscheduled,
        })
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn window(&self) -> &SchedulingWindow {
        &self.window
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Every fetched event, all-day ones included.
    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn busy(&self) -> &[BusyRange] {
        &self.busy
    }

    pub fn proposal(&self) -> Option<ProposedSlot> {
        match &self.state {
            SessionState::Reviewing { proposal, .. } | SessionState::Committed { proposal, .. } => {
                Some(*proposal)
            }
            SessionState::Unscheduled => None,
        }
    }

    pub fn is_conflicting(&self) -> bool {
        matches!(self.state, SessionState::Reviewing { conflicting: true, .. })
    }

    /// Replace the day's events, e.g. after a fresh fetch.
    pub fn set_events(&mut self, events: Vec<CalendarEvent>) {
        self.busy = merge_busy_intervals(&events);
        self.events = events;
        if let SessionState::Reviewing { proposal, .. } = self.state {
            self.review(proposal);
        }
    }

    /// Propose a block; the start is snapped to the grid and kept inside
    /// the day. Too late today for any block leaves the session unscheduled.
    pub fn propose(&mut self, start: NaiveDateTime, duration_minutes: u32) -> &SessionState {
        let proposal = on_drag_adjust(
            &self.window,
            DragKind::Move,
            0,
            ProposedSlot::new(start, duration_minutes),
        );
        self.review(proposal);
        &self.state
    }

    /// Propose the first free block of `duration_minutes`, if the day has
    /// one. The state is untouched when it does not.
    pub fn propose_default(&mut self, duration_minutes: u32) -> Option<ProposedSlot> {
        let start = default_start(&self.window, duration_minutes, &self.busy)?;
        let proposal = ProposedSlot::new(start, duration_minutes);
        self.review(proposal);
        Some(proposal)
    }

    /// Move or resize the current proposal.
    pub fn drag(&mut self, kind: DragKind, delta_minutes: i64) -> Result<&SessionState, CalendarError> {
        let SessionState::Reviewing { proposal, .. } = self.state else {
            return Err(CalendarError::NoProposal);
        };
        let adjusted = on_drag_adjust(&self.window, kind, delta_minutes, proposal);
        self.review(adjusted);
        Ok(&self.state)
    }

    /// Drop the proposal. Nothing was sent, so nothing is undone.
    pub fn cancel(&mut self) {
        if matches!(self.state, SessionState::Reviewing { .. }) {
            self.state = SessionState::Unscheduled;
        }
    }

    fn review(&mut self, proposal: ProposedSlot) {
        if proposal.duration_minutes == 0 {
            self.state = SessionState::Unscheduled;
            return;
        }
        self.state = SessionState::Reviewing {
            proposal,
            conflicting: is_conflicting(&proposal, &self.busy),
        };
    }

    /// The request a submit would send, or why it may not be sent.
    pub fn request(&self, offset: FixedOffset, time_zone: &str) -> Result<EventRequest, CalendarError> {
        let (proposal, conflicting) = match &self.state {
            SessionState::Reviewing {
                proposal,
                conflicting,
            } => (*proposal, *conflicting),
            _ => return Err(CalendarError::NoProposal),
        };
        if conflicting {
            return Err(CalendarError::Conflict {
                start: proposal.start,
                end: proposal.end(),
            });
        }
        Ok(EventRequest {
            title: self.title.clone(),
            start: local_to_utc(proposal.start, offset),
            end: local_to_utc(proposal.end(), offset),
            time_zone: time_zone.to_string(),
        })
    }

    /// Book the proposal. An item that already carries a calendar event
    /// has that event updated instead of a second one created.
    pub async fn submit<C: CalendarApi>(
        &mut self,
        api: &C,
        offset: FixedOffset,
        time_zone: &str,
    ) -> Result<ScheduledEvent, CalendarError> {
        let request = self.request(offset, time_zone)?;
        let Some(proposal) = self.proposal() else {
            return Err(CalendarError::NoProposal);
        };

        let (calendar_event_id, updated) = match &self.existing_event_id {
            Some(id) => (api.update_event(id, &request).await?, true),
            None => (api.insert_event(&request).await?, false),
        };

        self.existing_event_id = Some(calendar_event_id.clone());
        self.state = SessionState::Committed {
            calendar_event_id: calendar_event_id.clone(),
            proposal,
        };
        tracing::info!(item_id = %self.item_id, %calendar_event_id, updated, "scheduled item");
        Ok(ScheduledEvent {
            item_id: self.item_id.clone(),
            calendar_event_id,
            start: request.start,
            end: request.end,
            updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DaySlot;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CalendarApi for RecordingApi {
        async fn list_events(&self, _day: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError> {
            Ok(Vec::new())
        }

        async fn insert_event(&self, request: &EventRequest) -> Result<String, CalendarError> {
            if self.fail {
                return Err(CalendarError::Network("offline".into()));
            }
            self.calls.lock().unwrap().push(format!("insert {}", request.start.to_rfc3339()));
            Ok("evt-new".into())
        }

        async fn update_event(&self, id: &str, request: &EventRequest) -> Result<String, CalendarError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update {id} {}", request.start.to_rfc3339()));
            Ok(id.to_string())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
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

    fn item() -> PriorityItem {
        PriorityItem::new("Draft", DaySlot::AssignedTo(day()), 0, Utc::now()).unwrap()
    }

    fn meeting(start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: "m".into(),
            title: "Meeting".into(),
            start: at(start),
            end: at(end),
            is_all_day: false,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn backlog_items_cannot_be_scheduled() {
        let backlog = PriorityItem::new("Later", DaySlot::Backlog, 0, Utc::now()).unwrap();
        assert_eq!(
            SchedulingSession::new(&backlog, window()).unwrap_err(),
            ValidationError::BacklogNotSchedulable
        );
    }

    #[test]
    fn conflict_flag_follows_every_change() {
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.set_events(vec![meeting("10:00", "11:00")]);

        session.propose(at("09:30"), 45);
        assert!(session.is_conflicting());

        session.drag(DragKind::Resize, -15).unwrap();
        assert!(!session.is_conflicting());

        session.drag(DragKind::Move, 90).unwrap();
        assert_eq!(session.proposal().unwrap().start, at("11:00"));
        assert!(!session.is_conflicting());

        session.set_events(vec![meeting("11:15", "12:00")]);
        assert!(session.is_conflicting());
    }

    #[test]
    fn default_proposal_skips_busy_time() {
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.set_events(vec![meeting("08:00", "09:00")]);
        assert_eq!(session.propose_default(30).unwrap().start, at("09:00"));
        assert!(!session.is_conflicting());
    }

    #[test]
    fn cancel_returns_to_unscheduled() {
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.propose(at("09:00"), 30);
        session.cancel();
        assert_eq!(session.state(), &SessionState::Unscheduled);
        assert!(matches!(session.drag(DragKind::Move, 15), Err(CalendarError::NoProposal)));
    }

    #[test]
    fn late_proposal_today_never_starts_in_the_past() {
        let mut today = window();
        today.now = Some(at("23:20"));
        let mut session = SchedulingSession::new(&item(), today).unwrap();

        session.propose(at("23:30"), 60);
        let proposal = session.proposal().unwrap();
        assert!(proposal.start >= at("23:20"));
        assert_eq!(proposal.end(), today.end_of_day());

        session.drag(DragKind::Move, -180).unwrap();
        assert_eq!(session.proposal().unwrap().start, at("23:30"));
    }

    #[tokio::test]
    async fn proposal_after_last_grid_mark_is_not_sent() {
        let api = RecordingApi::default();
        let mut today = window();
        today.now = Some(at("23:50"));
        let mut session = SchedulingSession::new(&item(), today).unwrap();

        session.propose(at("23:45"), 30);
        assert_eq!(session.state(), &SessionState::Unscheduled);
        assert!(matches!(
            session.submit(&api, utc(), "UTC").await,
            Err(CalendarError::NoProposal)
        ));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflicting_submit_is_not_attempted() {
        let api = RecordingApi::default();
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.set_events(vec![meeting("09:00", "10:00")]);
        session.propose(at("09:30"), 30);

        let err = session.submit(&api, utc(), "UTC").await.unwrap_err();
        assert!(matches!(err, CalendarError::Conflict { .. }));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_without_proposal_fails() {
        let api = RecordingApi::default();
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        assert!(matches!(
            session.submit(&api, utc(), "UTC").await,
            Err(CalendarError::NoProposal)
        ));
    }

    #[tokio::test]
    async fn second_submit_updates_instead_of_duplicating() {
        let api = RecordingApi::default();
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.propose(at("09:00"), 30);
        let first = session.submit(&api, utc(), "UTC").await.unwrap();
        assert!(!first.updated);
        assert!(matches!(session.state(), SessionState::Committed { .. }));

        // A new attempt for the now-scheduled item.
        let mut scheduled = item();
        scheduled.calendar_event_id = Some(first.calendar_event_id.clone());
        let mut again = SchedulingSession::new(&scheduled, window()).unwrap();
        again.propose(at("14:00"), 30);
        let second = again.submit(&api, utc(), "UTC").await.unwrap();

        assert!(second.updated);
        assert_eq!(second.calendar_event_id, "evt-new");
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with("update evt-new"));
    }

    #[tokio::test]
    async fn failed_submit_stays_in_review() {
        let api = RecordingApi {
            fail: true,
            ..RecordingApi::default()
        };
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.propose(at("09:00"), 30);
        assert!(matches!(
            session.submit(&api, utc(), "UTC").await,
            Err(CalendarError::Network(_))
        ));
        assert!(matches!(session.state(), SessionState::Reviewing { .. }));
    }

    #[test]
    fn request_converts_to_utc() {
        let mut session = SchedulingSession::new(&item(), window()).unwrap();
        session.propose(at("09:00"), 60);
        let request = session
            .request(FixedOffset::east_opt(2 * 3600).unwrap(), "Europe/Berlin")
            .unwrap();
        assert_eq!(request.start.to_rfc3339(), "2026-07-01T07:00:00+00:00");
        assert_eq!(request.end.to_rfc3339(), "2026-07-01T08:00:00+00:00");
        assert_eq!(request.time_zone, "Europe/Berlin");
        assert_eq!(request.title, "Draft");
    }
}
