//! Integration tests for the Calendar adapter

use chrono::{TimeZone, Utc};
use serde_json::json;
use skillsync_core::domain::{Change, CollectionId, SyncToken};
use skillsync_core::ports::{ICalendarApi, ListRequest, RemoteError};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn primary() -> CollectionId {
    CollectionId::new("primary").unwrap()
}

#[tokio::test]
async fn test_list_calendars_page() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(query_param("showHidden", "true"))
        .and(query_param("maxResults", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "me@example.com", "summary": "Me", "primary": true, "accessRole": "owner" },
                { "id": "team@group.calendar.google.com", "summary": "Team", "selected": true },
                { "id": "old@group.calendar.google.com", "deleted": true }
            ],
            "nextSyncToken": "cal-list-sync-1"
        })))
        .mount(&server)
        .await;

    let page = api.list_calendars(&ListRequest::new(250)).await.unwrap();

    assert_eq!(page.items.len(), 3);
    assert!(!page.has_more());
    assert_eq!(
        page.next_sync_token,
        Some(SyncToken::new("cal-list-sync-1").unwrap())
    );
    let primary = page.items[0].upserted().unwrap();
    assert!(primary.primary);
    assert!(primary.selected);
    assert!(page.items[2].is_removal());
}

#[tokio::test]
async fn test_full_event_listing_uses_window_and_order() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .and(query_param("timeMin", "2026-09-16T00:00:00Z"))
        .and(query_param_is_missing("syncToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "e1",
                    "status": "confirmed",
                    "summary": "Planning",
                    "start": { "dateTime": "2026-10-20T10:00:00Z" },
                    "end": { "dateTime": "2026-10-20T11:00:00Z" },
                    "updated": "2026-10-01T00:00:00Z"
                }
            ],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let request = ListRequest::new(250)
        .with_time_min(Utc.with_ymd_and_hms(2026, 9, 16, 0, 0, 0).unwrap())
        .with_order_by("startTime");
    let page = api.list_events(&primary(), &request).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
    assert!(page.next_sync_token.is_none());
    let event = page.items[0].upserted().unwrap();
    assert_eq!(event.calendar_id, primary());
    assert_eq!(event.summary.as_deref(), Some("Planning"));
}

#[tokio::test]
async fn test_incremental_listing_reports_cancellations() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("syncToken", "sync-abc"))
        .and(query_param("showDeleted", "true"))
        .and(query_param_is_missing("orderBy"))
        .and(query_param_is_missing("timeMin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [ { "id": "e1", "status": "cancelled", "updated": "2026-10-15T00:00:00Z" } ],
            "nextSyncToken": "sync-def"
        })))
        .mount(&server)
        .await;

    let request = ListRequest::new(250)
        .with_sync_token(SyncToken::new("sync-abc").unwrap())
        .with_order_by("startTime");
    let page = api.list_events(&primary(), &request).await.unwrap();

    assert_eq!(
        page.items,
        vec![Change::Removed {
            id: "e1".to_string(),
            updated: Some(Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap()),
        }]
    );
    assert_eq!(page.next_sync_token, Some(SyncToken::new("sync-def").unwrap()));
}

#[tokio::test]
async fn test_gone_sync_token_is_cursor_invalid() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(410).set_body_json(common::vendor_error(
            410,
            "fullSyncRequired",
            "Sync token is no longer valid, a full sync is required.",
        )))
        .mount(&server)
        .await;

    let request = ListRequest::new(250).with_sync_token(SyncToken::new("stale").unwrap());
    let err = api.list_events(&primary(), &request).await.unwrap_err();

    assert!(err.is_cursor_invalid());
}

#[tokio::test]
async fn test_rejected_page_token_is_cursor_invalid() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("pageToken", "expired"))
        .respond_with(ResponseTemplate::new(400).set_body_json(common::vendor_error(
            400,
            "invalid",
            "Invalid Value: pageToken",
        )))
        .mount(&server)
        .await;

    let mut request = ListRequest::new(250);
    request.page_token = Some("expired".to_string());
    let err = api.list_events(&primary(), &request).await.unwrap_err();

    assert!(err.is_cursor_invalid());
}

#[tokio::test]
async fn test_calendar_id_is_path_encoded() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/calendars/en.usa%23holiday%40group.v.calendar.google.com/events"))
        .respond_with(ResponseTemplate::new(404).set_body_json(common::vendor_error(
            404, "notFound", "Not Found",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let holidays = CollectionId::new("en.usa#holiday@group.v.calendar.google.com").unwrap();
    let err = api
        .list_events(&holidays, &ListRequest::new(10))
        .await
        .unwrap_err();

    assert!(err.is_not_found_or_unsupported());
}

#[tokio::test]
async fn test_get_event_and_cancelled_is_not_found() {
    let (server, api) = common::setup_calendar_mock().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events/e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "e1",
            "start": { "date": "2026-10-20" },
            "end": { "date": "2026-10-21" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events/e2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "e2", "status": "cancelled" })),
        )
        .mount(&server)
        .await;

    let event = api.get_event(&primary(), "e1").await.unwrap();
    assert!(event.start.is_all_day());

    let err = api.get_event(&primary(), "e2").await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
}

#[tokio::test]
async fn test_create_update_delete_event() {
    let (server, api) = common::setup_calendar_mock().await;
    let created = json!({
        "id": "new1",
        "summary": "Lunch",
        "start": { "dateTime": "2026-10-20T12:00:00Z" },
        "end": { "dateTime": "2026-10-20T13:00:00Z" },
        "updated": "2026-10-16T09:00:00Z"
    });
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(created.clone()))
        .mount(&server)
        .await;
    let mut patched = created.clone();
    patched["summary"] = json!("Long lunch");
    Mock::given(method("PATCH"))
        .and(path("/calendars/primary/events/new1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patched))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/new1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/gone"))
        .respond_with(ResponseTemplate::new(410).set_body_json(common::vendor_error(
            410, "deleted", "Resource has been deleted",
        )))
        .mount(&server)
        .await;

    let event = api
        .create_event(&primary(), &json!({ "summary": "Lunch" }))
        .await
        .unwrap();
    assert_eq!(event.id, "new1");

    let event = api
        .update_event(&primary(), "new1", &json!({ "summary": "Long lunch" }))
        .await
        .unwrap();
    assert_eq!(event.summary.as_deref(), Some("Long lunch"));

    api.delete_event(&primary(), "new1").await.unwrap();
    api.delete_event(&primary(), "gone").await.unwrap();
}
