//! Integration tests for the Drive, Sheets and Docs adapter

use chrono::{TimeZone, Utc};
use serde_json::json;
use skillsync_core::domain::SyncToken;
use skillsync_core::ports::{IDriveApi, ListRequest, RemoteError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_start_page_token() {
    let (server, api) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "startPageToken": "1000" })))
        .mount(&server)
        .await;

    assert_eq!(api.start_page_token().await.unwrap(), "1000");
}

#[tokio::test]
async fn test_list_files_filters_by_modified_time() {
    let (server, api) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param(
            "q",
            "trashed = false and modifiedTime > '2026-09-16T00:00:00Z'",
        ))
        .and(query_param("orderBy", "modifiedTime desc"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {
                    "id": "s1",
                    "name": "Budget",
                    "mimeType": "application/vnd.google-apps.spreadsheet",
                    "modifiedTime": "2026-10-01T00:00:00Z"
                },
                {
                    "id": "p1",
                    "name": "photo.jpg",
                    "mimeType": "image/jpeg",
                    "size": "52431",
                    "modifiedTime": "2026-10-02T00:00:00Z"
                }
            ],
            "nextPageToken": "files-2"
        })))
        .mount(&server)
        .await;

    let request = ListRequest::new(100)
        .with_time_min(Utc.with_ymd_and_hms(2026, 9, 16, 0, 0, 0).unwrap())
        .with_order_by("modifiedTime desc");
    let page = api.list_files(&request).await.unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[1].size, Some(52431));
    assert_eq!(page.next_page_token.as_deref(), Some("files-2"));
}

#[tokio::test]
async fn test_list_changes_last_page() {
    let (server, api) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "1000"))
        .and(query_param("includeRemoved", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "changes": [
                {
                    "fileId": "d1",
                    "removed": false,
                    "time": "2026-10-15T00:00:00Z",
                    "file": {
                        "id": "d1",
                        "name": "Notes",
                        "mimeType": "application/vnd.google-apps.document",
                        "modifiedTime": "2026-10-15T00:00:00Z"
                    }
                },
                { "fileId": "x1", "removed": true, "time": "2026-10-15T01:00:00Z" },
                { "changeType": "drive", "driveId": "shared1", "removed": false }
            ],
            "newStartPageToken": "1005"
        })))
        .mount(&server)
        .await;

    let request = ListRequest::new(100).with_page_token(Some("1000".to_string()));
    let page = api.list_changes(&request).await.unwrap();

    assert_eq!(page.items.len(), 2);
    assert!(page.items[1].is_removal());
    assert!(!page.has_more());
    assert_eq!(page.next_sync_token, Some(SyncToken::new("1005").unwrap()));
}

#[tokio::test]
async fn test_list_changes_invalid_token_is_cursor_invalid() {
    let (server, api) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/changes"))
        .respond_with(ResponseTemplate::new(400).set_body_json(common::vendor_error(
            400,
            "invalid",
            "Invalid Value: pageToken",
        )))
        .mount(&server)
        .await;

    let request = ListRequest::new(100).with_page_token(Some("bogus".to_string()));
    let err = api.list_changes(&request).await.unwrap_err();

    assert!(err.is_cursor_invalid());
}

#[tokio::test]
async fn test_list_changes_requires_page_token() {
    let (_server, api) = common::setup_drive_mock().await;
    let err = api.list_changes(&ListRequest::new(100)).await.unwrap_err();
    assert!(matches!(err, RemoteError::Config(_)));
}

#[tokio::test]
async fn test_get_file_not_found() {
    let (server, api) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/files/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(common::vendor_error(
            404,
            "notFound",
            "File not found: nope.",
        )))
        .mount(&server)
        .await;

    let err = api.get_file("nope").await.unwrap_err();
    assert_eq!(err, RemoteError::NotFound("File not found: nope.".to_string()));
}

#[tokio::test]
async fn test_spreadsheet_and_document_use_their_base_urls() {
    let (server, api) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/sheets/v4/spreadsheets/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "s1",
            "properties": { "title": "Budget" },
            "sheets": [ { "properties": { "title": "Q1" } } ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/v1/documents/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documentId": "d1",
            "title": "Notes",
            "body": { "content": [
                { "paragraph": { "elements": [ { "textRun": { "content": "Agenda\n" } } ] } }
            ] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sheet = api.get_spreadsheet("s1").await.unwrap();
    assert_eq!(sheet.sheet_titles, vec!["Q1"]);

    let doc = api.get_document("d1").await.unwrap();
    assert_eq!(doc.body_text, "Agenda\n");
}
