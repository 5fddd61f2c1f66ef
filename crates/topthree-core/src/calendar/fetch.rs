//! Busy-time fetching that keeps only the newest request's answer.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;

use super::client::CalendarApi;
use super::slots::CalendarEvent;
use crate::error::CalendarError;

/// Wraps a [`CalendarApi`] so a response to a superseded request is
/// discarded instead of overwriting a newer one.
pub struct BusyFetcher<C> {
    api: C,
    generation: AtomicU64,
}

impl<C: CalendarApi> BusyFetcher<C> {
    pub fn new(api: C) -> Self {
        Self {
            api,
            generation: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    /// Fetch `day`'s events. `Ok(None)` means a later `fetch` or `cancel`
    /// superseded this one while it was in flight.
    pub async fn fetch(&self, day: NaiveDate) -> Result<Option<Vec<CalendarEvent>>, CalendarError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.api.list_events(day).await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::warn!(%day, ticket, "discarding stale calendar response");
            return Ok(None);
        }
        result.map(Some)
    }

    /// Supersede whatever fetch is in flight.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::client::EventRequest;
    use std::time::Duration;

    /// Answers after `day.day() * 20` ms with one event titled by the day.
    struct SlowApi;

    impl CalendarApi for SlowApi {
        async fn list_events(&self, day: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError> {
            use chrono::Datelike;
            tokio::time::sleep(Duration::from_millis(u64::from(day.day()) * 20)).await;
            let start = day.and_hms_opt(9, 0, 0).unwrap();
            Ok(vec![CalendarEvent {
                id: day.to_string(),
                title: day.to_string(),
                start,
                end: start,
                is_all_day: false,
            }])
        }

        async fn insert_event(&self, _request: &EventRequest) -> Result<String, CalendarError> {
            Err(CalendarError::NoProposal)
        }

        async fn update_event(&self, _id: &str, _request: &EventRequest) -> Result<String, CalendarError> {
            Err(CalendarError::NoProposal)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[tokio::test]
    async fn only_latest_response_survives() {
        let fetcher = BusyFetcher::new(SlowApi);
        let (slow, fast) = tokio::join!(fetcher.fetch(day(5)), fetcher.fetch(day(1)));

        assert!(slow.unwrap().is_none());
        let fast = fast.unwrap().unwrap();
        assert_eq!(fast[0].id, "2026-02-01");
    }

    #[tokio::test]
    async fn cancel_discards_in_flight_fetch() {
        let fetcher = BusyFetcher::new(SlowApi);
        let (result, ()) = tokio::join!(fetcher.fetch(day(2)), async { fetcher.cancel() });
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn lone_fetch_returns_events() {
        let fetcher = BusyFetcher::new(SlowApi);
        assert_eq!(fetcher.fetch(day(1)).await.unwrap().unwrap().len(), 1);
    }
}
