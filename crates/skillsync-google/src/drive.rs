//! Google Drive v3 adapter (with Sheets v4 and Docs v1 details)
//!
//! The Drive client's base URL points at Drive; spreadsheet and document
//! calls reuse the same client with a per-call base URL override so they
//! share credentials, retries and rate-limit state.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use skillsync_core::domain::{Change, Document, DriveFile, ExtensionPayload, Spreadsheet, SyncToken};
use skillsync_core::ports::{IDriveApi, ListRequest, Page, RemoteError};
use tracing::{debug, warn};

use crate::client::{encode_segment, map_page_token_error, ApiClient, FetchOptions};

/// File fields requested everywhere a file resource is returned
const FILE_FIELDS: &str =
    "id,name,mimeType,modifiedTime,size,parents,trashed,webViewLink,owners(displayName,emailAddress)";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileWire {
    id: String,
    name: Option<String>,
    mime_type: Option<String>,
    modified_time: Option<DateTime<Utc>>,
    /// Drive sends int64 values as strings
    size: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    trashed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeListResponse {
    #[serde(default)]
    changes: Vec<ChangeWire>,
    next_page_token: Option<String>,
    new_start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeWire {
    file_id: Option<String>,
    #[serde(default)]
    removed: bool,
    time: Option<DateTime<Utc>>,
    file: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPageTokenResponse {
    start_page_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetWire {
    spreadsheet_id: String,
    properties: Option<TitleWire>,
    #[serde(default)]
    sheets: Vec<SheetWire>,
}

#[derive(Debug, Deserialize)]
struct SheetWire {
    properties: Option<TitleWire>,
}

#[derive(Debug, Deserialize)]
struct TitleWire {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentWire {
    document_id: String,
    title: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

pub(crate) fn file_from_value(value: Value, now: DateTime<Utc>) -> Result<DriveFile, String> {
    let wire: FileWire = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    Ok(DriveFile {
        id: wire.id,
        name: wire.name.unwrap_or_default(),
        mime_type: wire.mime_type.unwrap_or_default(),
        modified_time: wire.modified_time,
        size: wire.size.and_then(|s| s.parse().ok()),
        parents: wire.parents,
        trashed: wire.trashed,
        payload: ExtensionPayload::new(value),
        synced_at: now,
    })
}

fn change_from_wire(change: ChangeWire, now: DateTime<Utc>) -> Result<Option<Change<DriveFile>>, String> {
    // Shared-drive changes carry no fileId
    let Some(file_id) = change.file_id else {
        return Ok(None);
    };
    if change.removed {
        return Ok(Some(Change::Removed {
            id: file_id,
            updated: change.time,
        }));
    }
    match change.file {
        Some(value) => file_from_value(value, now).map(|f| Some(Change::Upsert(f))),
        None => Err(format!("change for {} has no file resource", file_id)),
    }
}

/// Concatenates the text runs of a Docs body, tables included
fn collect_text(elements: &[Value], out: &mut String) {
    for element in elements {
        if let Some(runs) = element
            .pointer("/paragraph/elements")
            .and_then(Value::as_array)
        {
            for run in runs {
                if let Some(text) = run.pointer("/textRun/content").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }
        if let Some(rows) = element.pointer("/table/tableRows").and_then(Value::as_array) {
            for row in rows {
                let cells = row.get("tableCells").and_then(Value::as_array);
                for cell in cells.into_iter().flatten() {
                    if let Some(content) = cell.get("content").and_then(Value::as_array) {
                        collect_text(content, out);
                    }
                }
            }
        }
    }
}

pub(crate) fn document_from_value(value: Value) -> Result<Document, String> {
    let wire: DocumentWire = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    let mut body_text = String::new();
    if let Some(content) = value.pointer("/body/content").and_then(Value::as_array) {
        collect_text(content, &mut body_text);
    }
    Ok(Document {
        id: wire.document_id,
        title: wire.title.unwrap_or_default(),
        modified_time: None,
        body_text,
        payload: ExtensionPayload::new(value),
    })
}

pub(crate) fn spreadsheet_from_value(value: Value) -> Result<Spreadsheet, String> {
    let wire: SpreadsheetWire = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    Ok(Spreadsheet {
        id: wire.spreadsheet_id,
        title: wire.properties.and_then(|p| p.title).unwrap_or_default(),
        modified_time: None,
        sheet_titles: wire
            .sheets
            .into_iter()
            .filter_map(|s| s.properties.and_then(|p| p.title))
            .collect(),
        payload: ExtensionPayload::new(value),
    })
}

/// Drive answers a stale change-log token with 404, or 400 naming `pageToken`
fn map_change_log_error(error: RemoteError) -> RemoteError {
    match error {
        RemoteError::NotFound(message) => RemoteError::CursorInvalid(message),
        other => map_page_token_error(other),
    }
}

// ============================================================================
// GoogleDriveApi
// ============================================================================

/// [`IDriveApi`] backed by Drive v3, Sheets v4 and Docs v1
pub struct GoogleDriveApi {
    client: ApiClient,
    sheets_base_url: String,
    docs_base_url: String,
}

impl GoogleDriveApi {
    pub fn new(
        client: ApiClient,
        sheets_base_url: impl Into<String>,
        docs_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            sheets_base_url: sheets_base_url.into(),
            docs_base_url: docs_base_url.into(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl IDriveApi for GoogleDriveApi {
    async fn start_page_token(&self) -> Result<String, RemoteError> {
        let response: StartPageTokenResponse = self
            .client
            .fetch(Method::GET, "/changes/startPageToken", FetchOptions::new())
            .await?;
        Ok(response.start_page_token)
    }

    async fn list_changes(
        &self,
        request: &ListRequest,
    ) -> Result<Page<Change<DriveFile>>, RemoteError> {
        let Some(page_token) = request.page_token.as_deref() else {
            return Err(RemoteError::Config(
                "change listing requires a page token".to_string(),
            ));
        };

        let options = FetchOptions::new()
            .query("pageToken", page_token)
            .query_opt("pageSize", (request.page_size > 0).then_some(request.page_size))
            .query("includeRemoved", "true")
            .query("spaces", "drive")
            .query(
                "fields",
                format!(
                    "nextPageToken,newStartPageToken,changes(fileId,removed,time,file({}))",
                    FILE_FIELDS
                ),
            );

        let response: ChangeListResponse = self
            .client
            .fetch(Method::GET, "/changes", options)
            .await
            .map_err(map_change_log_error)?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(response.changes.len());
        for change in response.changes {
            match change_from_wire(change, now) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Skipping malformed drive change"),
            }
        }
        debug!(
            count = items.len(),
            has_more = response.next_page_token.is_some(),
            "Fetched drive changes page"
        );

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
            next_sync_token: response
                .new_start_page_token
                .and_then(|t| SyncToken::new(t).ok()),
        })
    }

    async fn list_files(&self, request: &ListRequest) -> Result<Page<DriveFile>, RemoteError> {
        let mut q = "trashed = false".to_string();
        if let Some(time_min) = request.time_min {
            q.push_str(&format!(
                " and modifiedTime > '{}'",
                time_min.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        let options = FetchOptions::new()
            .query("q", q)
            .query_opt("pageSize", (request.page_size > 0).then_some(request.page_size))
            .query_opt("pageToken", request.page_token.as_deref())
            .query_opt("orderBy", request.order_by.as_deref())
            .query("fields", format!("nextPageToken,files({})", FILE_FIELDS));

        let response: FileListResponse = self
            .client
            .fetch(Method::GET, "/files", options)
            .await
            .map_err(map_page_token_error)?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(response.files.len());
        for value in response.files {
            match file_from_value(value, now) {
                Ok(file) => items.push(file),
                Err(e) => warn!(error = %e, "Skipping malformed drive file"),
            }
        }
        debug!(
            count = items.len(),
            has_more = response.next_page_token.is_some(),
            "Fetched drive files page"
        );

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
            next_sync_token: None,
        })
    }

    async fn get_file(&self, file_id: &str) -> Result<DriveFile, RemoteError> {
        let value: Value = self
            .client
            .fetch(
                Method::GET,
                &format!("/files/{}", encode_segment(file_id)),
                FetchOptions::new().query("fields", FILE_FIELDS),
            )
            .await?;
        file_from_value(value, Utc::now()).map_err(RemoteError::InvalidResponse)
    }

    async fn get_spreadsheet(&self, file_id: &str) -> Result<Spreadsheet, RemoteError> {
        let value: Value = self
            .client
            .fetch(
                Method::GET,
                &format!("/spreadsheets/{}", encode_segment(file_id)),
                FetchOptions::new()
                    .base_url(self.sheets_base_url.as_str())
                    .query(
                        "fields",
                        "spreadsheetId,properties(title,locale,timeZone),sheets(properties(sheetId,title,index))",
                    ),
            )
            .await?;
        spreadsheet_from_value(value).map_err(RemoteError::InvalidResponse)
    }

    async fn get_document(&self, file_id: &str) -> Result<Document, RemoteError> {
        let value: Value = self
            .client
            .fetch(
                Method::GET,
                &format!("/documents/{}", encode_segment(file_id)),
                FetchOptions::new().base_url(self.docs_base_url.as_str()),
            )
            .await?;
        document_from_value(value).map_err(RemoteError::InvalidResponse)
    }
}
