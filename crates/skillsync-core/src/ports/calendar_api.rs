//! Calendar vendor port (driven/secondary port)
//!
//! Listing methods return [`Change`] entries so deletions seen in incremental
//! mode reach the reconciler in page order. Item methods are single
//! request/response calls, never paginated.

use async_trait::async_trait;

use crate::domain::{newtypes::CollectionId, CalendarEvent, Change, RemoteCollection};
use crate::ports::remote::{ListRequest, Page, RemoteError};

#[async_trait]
pub trait ICalendarApi: Send + Sync {
    /// Lists the user's calendars
    async fn list_calendars(
        &self,
        request: &ListRequest,
    ) -> Result<Page<Change<RemoteCollection>>, RemoteError>;

    /// Lists events of one calendar
    async fn list_events(
        &self,
        calendar_id: &CollectionId,
        request: &ListRequest,
    ) -> Result<Page<Change<CalendarEvent>>, RemoteError>;

    async fn get_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<CalendarEvent, RemoteError>;

    /// Creates an event from a vendor-shaped JSON body
    async fn create_event(
        &self,
        calendar_id: &CollectionId,
        body: &serde_json::Value,
    ) -> Result<CalendarEvent, RemoteError>;

    /// Applies a partial update (PATCH semantics)
    async fn update_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
        patch: &serde_json::Value,
    ) -> Result<CalendarEvent, RemoteError>;

    async fn delete_event(&self, calendar_id: &CollectionId, event_id: &str)
        -> Result<(), RemoteError>;
}
