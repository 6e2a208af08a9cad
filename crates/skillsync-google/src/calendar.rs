//! Google Calendar v3 adapter
//!
//! Implements [`ICalendarApi`] over `calendarList` and `events`. Listings are
//! requested with `singleEvents=true` so recurring events arrive expanded
//! into instances that each carry their own start/end.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use skillsync_core::domain::{
    CalendarEvent, Change, CollectionId, CollectionKind, EventTime, ExtensionPayload,
    RemoteCollection, SyncToken,
};
use skillsync_core::ports::{ICalendarApi, ListRequest, Page, RemoteError};
use tracing::{debug, warn};

use crate::client::{encode_segment, map_page_token_error, ApiClient, FetchOptions};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntryWire {
    id: String,
    summary: Option<String>,
    summary_override: Option<String>,
    time_zone: Option<String>,
    access_role: Option<String>,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    hidden: bool,
    selected: Option<bool>,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventWire {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    start: Option<EventTimeWire>,
    end: Option<EventTimeWire>,
    updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTimeWire {
    date: Option<NaiveDate>,
    date_time: Option<DateTime<FixedOffset>>,
}

impl EventTimeWire {
    fn into_event_time(self) -> Option<EventTime> {
        match (self.date_time, self.date) {
            (Some(dt), _) => Some(EventTime::DateTime(dt)),
            (None, Some(date)) => Some(EventTime::Date(date)),
            (None, None) => None,
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Converts one `calendarList` entry; `deleted` entries become removals
fn collection_from_value(value: Value, now: DateTime<Utc>) -> Result<Change<RemoteCollection>, String> {
    let wire: CalendarListEntryWire =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    if wire.deleted {
        return Ok(Change::Removed {
            id: wire.id,
            updated: None,
        });
    }

    let id = CollectionId::new(wire.id).map_err(|e| e.to_string())?;
    Ok(Change::Upsert(RemoteCollection {
        id,
        kind: CollectionKind::Calendar,
        summary: wire.summary_override.or(wire.summary).unwrap_or_default(),
        time_zone: wire.time_zone,
        access_role: wire.access_role,
        primary: wire.primary,
        hidden: wire.hidden,
        // Google omits `selected` for calendars unticked in the UI
        selected: wire.selected.unwrap_or(wire.primary),
        payload: ExtensionPayload::new(value),
        synced_at: now,
    }))
}

/// Converts one event resource; `cancelled` events become removals
pub(crate) fn event_from_value(
    calendar_id: &CollectionId,
    value: Value,
    now: DateTime<Utc>,
) -> Result<Change<CalendarEvent>, String> {
    let wire: EventWire = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    if wire.status.as_deref() == Some("cancelled") {
        return Ok(Change::Removed {
            id: wire.id,
            updated: wire.updated,
        });
    }

    let start = wire
        .start
        .and_then(EventTimeWire::into_event_time)
        .ok_or_else(|| format!("event {} has no start", wire.id))?;
    let end = wire
        .end
        .and_then(EventTimeWire::into_event_time)
        .unwrap_or(start);

    Ok(Change::Upsert(CalendarEvent {
        calendar_id: calendar_id.clone(),
        id: wire.id,
        summary: wire.summary,
        status: wire.status,
        start,
        end,
        updated: wire.updated,
        payload: ExtensionPayload::new(value),
        synced_at: now,
    }))
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn next_sync_token(raw: Option<String>) -> Option<SyncToken> {
    raw.and_then(|t| SyncToken::new(t).ok())
}

// ============================================================================
// GoogleCalendarApi
// ============================================================================

/// [`ICalendarApi`] backed by Google Calendar v3
pub struct GoogleCalendarApi {
    client: ApiClient,
}

impl GoogleCalendarApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn events_path(calendar_id: &CollectionId) -> String {
        format!("/calendars/{}/events", encode_segment(calendar_id.as_str()))
    }

    fn event_path(calendar_id: &CollectionId, event_id: &str) -> String {
        format!(
            "{}/{}",
            Self::events_path(calendar_id),
            encode_segment(event_id)
        )
    }

    fn list_options(request: &ListRequest) -> FetchOptions {
        let mut options = FetchOptions::new()
            .query_opt("maxResults", (request.page_size > 0).then_some(request.page_size))
            .query_opt("pageToken", request.page_token.as_deref());
        if let Some(token) = &request.sync_token {
            options = options.query("syncToken", token.as_str());
        }
        if request.show_deleted {
            options = options.query("showDeleted", "true");
        }
        options
    }

    fn single_event(
        calendar_id: &CollectionId,
        value: Value,
    ) -> Result<CalendarEvent, RemoteError> {
        match event_from_value(calendar_id, value, Utc::now()) {
            Ok(Change::Upsert(event)) => Ok(event),
            Ok(Change::Removed { id, .. }) => {
                Err(RemoteError::NotFound(format!("event {} is cancelled", id)))
            }
            Err(e) => Err(RemoteError::InvalidResponse(e)),
        }
    }
}

#[async_trait]
impl ICalendarApi for GoogleCalendarApi {
    async fn list_calendars(
        &self,
        request: &ListRequest,
    ) -> Result<Page<Change<RemoteCollection>>, RemoteError> {
        let options = Self::list_options(request).query("showHidden", "true");
        let response: ListResponse = self
            .client
            .fetch(Method::GET, "/users/me/calendarList", options)
            .await?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(response.items.len());
        for value in response.items {
            match collection_from_value(value, now) {
                Ok(change) => items.push(change),
                Err(e) => warn!(error = %e, "Skipping malformed calendar list entry"),
            }
        }
        debug!(
            count = items.len(),
            has_more = response.next_page_token.is_some(),
            "Fetched calendar list page"
        );

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
            next_sync_token: next_sync_token(response.next_sync_token),
        })
    }

    async fn list_events(
        &self,
        calendar_id: &CollectionId,
        request: &ListRequest,
    ) -> Result<Page<Change<CalendarEvent>>, RemoteError> {
        let mut options = Self::list_options(request).query("singleEvents", "true");
        if !request.is_incremental() {
            // syncToken requests reject orderBy and timeMin
            options = options
                .query_opt("timeMin", request.time_min.map(rfc3339))
                .query_opt("orderBy", request.order_by.as_deref());
        }

        let response: ListResponse = self
            .client
            .fetch(Method::GET, &Self::events_path(calendar_id), options)
            .await
            .map_err(map_page_token_error)?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(response.items.len());
        for value in response.items {
            match event_from_value(calendar_id, value, now) {
                Ok(change) => items.push(change),
                Err(e) => warn!(calendar = %calendar_id, error = %e, "Skipping malformed event"),
            }
        }
        debug!(
            calendar = %calendar_id,
            count = items.len(),
            has_more = response.next_page_token.is_some(),
            "Fetched events page"
        );

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
            next_sync_token: next_sync_token(response.next_sync_token),
        })
    }

    async fn get_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<CalendarEvent, RemoteError> {
        let value: Value = self
            .client
            .fetch(
                Method::GET,
                &Self::event_path(calendar_id, event_id),
                FetchOptions::new(),
            )
            .await?;
        Self::single_event(calendar_id, value)
    }

    async fn create_event(
        &self,
        calendar_id: &CollectionId,
        body: &Value,
    ) -> Result<CalendarEvent, RemoteError> {
        let value: Value = self
            .client
            .fetch(
                Method::POST,
                &Self::events_path(calendar_id),
                FetchOptions::new().body(body.clone()),
            )
            .await?;
        Self::single_event(calendar_id, value)
    }

    async fn update_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
        patch: &Value,
    ) -> Result<CalendarEvent, RemoteError> {
        let value: Value = self
            .client
            .fetch(
                Method::PATCH,
                &Self::event_path(calendar_id, event_id),
                FetchOptions::new().body(patch.clone()),
            )
            .await?;
        Self::single_event(calendar_id, value)
    }

    async fn delete_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<(), RemoteError> {
        let result = self
            .client
            .fetch_empty(
                Method::DELETE,
                &Self::event_path(calendar_id, event_id),
                FetchOptions::new(),
            )
            .await;
        match result {
            // 410 Gone: already deleted
            Err(RemoteError::CursorInvalid(_)) => Ok(()),
            other => other,
        }
    }
}
