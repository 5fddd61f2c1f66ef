//! Google Calendar v3 REST client.
//!
//! Event times cross the wire as RFC 3339 instants and are mapped onto the
//! user's local wall time with the configured fixed offset.

use std::future::Future;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use super::slots::CalendarEvent;
use super::{local_to_utc, utc_to_local};
use crate::auth::TokenProvider;
use crate::error::{CalendarError, ConfigError};
use crate::storage::CalendarConfig;

/// Body of an insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA zone name passed through to the provider.
    pub time_zone: String,
}

/// The calendar collaborator: list a day's events, create or update one.
pub trait CalendarApi: Send + Sync {
    fn list_events(
        &self,
        day: NaiveDate,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, CalendarError>> + Send;

    /// Returns the new event's id.
    fn insert_event(
        &self,
        request: &EventRequest,
    ) -> impl Future<Output = Result<String, CalendarError>> + Send;

    /// Returns the event id the provider reports back.
    fn update_event(
        &self,
        event_id: &str,
        request: &EventRequest,
    ) -> impl Future<Output = Result<String, CalendarError>> + Send;
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<String>,
    start: ApiEventTime,
    end: ApiEventTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct GoogleCalendarClient<T> {
    http: Client,
    base_url: String,
    calendar_id: String,
    offset: FixedOffset,
    tokens: T,
}

impl<T: TokenProvider> GoogleCalendarClient<T> {
    pub fn new(config: &CalendarConfig, tokens: T) -> Result<Self, ConfigError> {
        Ok(Self {
            http: Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            offset: config.offset()?,
            tokens,
        })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_body(request: &EventRequest) -> serde_json::Value {
        json!({
            "summary": request.title,
            "start": {
                "dateTime": request.start.to_rfc3339(),
                "timeZone": request.time_zone,
            },
            "end": {
                "dateTime": request.end.to_rfc3339(),
                "timeZone": request.time_zone,
            },
        })
    }

    fn convert(&self, event: ApiEvent) -> Result<CalendarEvent, CalendarError> {
        let title = event.summary.unwrap_or_else(|| "(No title)".to_string());
        match (event.start.date_time, event.end.date_time) {
            (Some(start), Some(end)) => Ok(CalendarEvent {
                id: event.id,
                title,
                start: utc_to_local(parse_instant(&start)?, self.offset),
                end: utc_to_local(parse_instant(&end)?, self.offset),
                is_all_day: false,
            }),
            _ => {
                let start = parse_date(event.start.date.as_deref())?;
                let end = match event.end.date.as_deref() {
                    Some(_) => parse_date(event.end.date.as_deref())?,
                    None => start + Duration::days(1),
                };
                Ok(CalendarEvent {
                    id: event.id,
                    title,
                    start: start.and_time(NaiveTime::MIN),
                    end: end.and_time(NaiveTime::MIN),
                    is_all_day: true,
                })
            }
        }
    }
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, CalendarError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CalendarError::InvalidResponse(format!("bad dateTime '{value}': {e}")))
}

fn parse_date(value: Option<&str>) -> Result<NaiveDate, CalendarError> {
    let value = value.ok_or_else(|| CalendarError::InvalidResponse("event has no start".into()))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| CalendarError::InvalidResponse(format!("bad date '{value}': {e}")))
}

/// Map a non-success status to `CalendarError::Api`, preferring the
/// provider's own message.
async fn check_status(resp: Response) -> Result<Response, CalendarError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    Err(CalendarError::Api {
        status: status.as_u16(),
        message,
    })
}

impl<T: TokenProvider> CalendarApi for GoogleCalendarClient<T> {
    async fn list_events(&self, day: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError> {
        let token = self.tokens.get_valid_token().await?;
        let day_start = day.and_time(NaiveTime::MIN);
        let time_min = local_to_utc(day_start, self.offset).to_rfc3339();
        let time_max = local_to_utc(day_start + Duration::days(1), self.offset).to_rfc3339();

        let resp = self
            .http
            .get(self.events_url())
            .bearer_auth(&token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?;
        let list: EventList = check_status(resp).await?.json().await?;

        let events = list
            .items
            .into_iter()
            .filter(|e| e.status.as_deref() != Some("cancelled"))
            .map(|e| self.convert(e))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(%day, count = events.len(), "fetched calendar events");
        Ok(events)
    }

    async fn insert_event(&self, request: &EventRequest) -> Result<String, CalendarError> {
        let token = self.tokens.get_valid_token().await?;
        let resp = self
            .http
            .post(self.events_url())
            .bearer_auth(&token)
            .json(&Self::event_body(request))
            .send()
            .await?;
        let created: CreatedEvent = check_status(resp).await?.json().await?;
        tracing::debug!(event_id = %created.id, "created calendar event");
        Ok(created.id)
    }

    async fn update_event(&self, event_id: &str, request: &EventRequest) -> Result<String, CalendarError> {
        let token = self.tokens.get_valid_token().await?;
        let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));
        let resp = self
            .http
            .patch(url)
            .bearer_auth(&token)
            .json(&Self::event_body(request))
            .send()
            .await?;
        let updated: CreatedEvent = check_status(resp).await?.json().await?;
        tracing::debug!(event_id = %updated.id, "updated calendar event");
        Ok(updated.id)
    }
}
