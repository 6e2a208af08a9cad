//! Shared fixtures: scripted vendor fakes over an in-memory store
//!
//! Listing fakes pop one scripted result per call. An exhausted script
//! answers with an empty last page carrying a default cursor.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde_json::json;
use tokio::sync::Notify;

use skillsync_cache::{DatabasePool, SqliteLocalStore};
use skillsync_core::domain::{
    CalendarEvent, Change, CollectionId, Document, DriveFile, EventTime, ExtensionPayload,
    RemoteCollection, Spreadsheet, SyncToken,
};
use skillsync_core::ports::{
    Credential, ICalendarApi, ICredentialProvider, IDriveApi, ILocalStore, ListRequest, Page,
    RemoteError,
};
use skillsync_sync::{SyncContext, SyncSettings};

pub const DEFAULT_EVENTS_TOKEN: &str = "events-default";
pub const DEFAULT_LIST_TOKEN: &str = "list-default";
pub const DEFAULT_CHANGES_TOKEN: &str = "changes-default";
pub const START_PAGE_TOKEN: &str = "start-1";

type Scripted<T> = Mutex<VecDeque<Result<Page<T>, RemoteError>>>;

// ============================================================================
// Builders
// ============================================================================

/// Midnight UTC today plus `n` days
pub fn day(n: i64) -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(n)
}

pub fn cal(id: &str) -> CollectionId {
    CollectionId::new(id).unwrap()
}

pub fn token(value: &str) -> SyncToken {
    SyncToken::new(value).unwrap()
}

/// One-hour event starting at `start`
pub fn event_at(calendar: &str, id: &str, start: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        calendar_id: cal(calendar),
        id: id.to_string(),
        summary: Some(format!("Event {id}")),
        status: Some("confirmed".to_string()),
        start: EventTime::DateTime(start.fixed_offset()),
        end: EventTime::DateTime((start + Duration::hours(1)).fixed_offset()),
        updated: Some(start - Duration::days(1)),
        payload: ExtensionPayload::new(json!({ "id": id })),
        synced_at: Utc::now(),
    }
}

pub fn event(calendar: &str, id: &str, start_day: i64) -> CalendarEvent {
    event_at(calendar, id, day(start_day) + Duration::hours(9))
}

/// `count` events named `{prefix}-{i}`, one per hour from tomorrow 09:00
pub fn events(calendar: &str, prefix: &str, count: usize) -> Vec<Change<CalendarEvent>> {
    (0..count)
        .map(|i| {
            let start = day(1) + Duration::hours(9 + i as i64);
            Change::Upsert(event_at(calendar, &format!("{prefix}-{i}"), start))
        })
        .collect()
}

pub fn collection(id: &str, primary: bool) -> RemoteCollection {
    let mut collection = RemoteCollection::calendar(cal(id), id.to_uppercase());
    collection.primary = primary;
    collection
}

pub fn file(id: &str, mime: &str, modified: DateTime<Utc>) -> DriveFile {
    DriveFile {
        id: id.to_string(),
        name: format!("{id}.doc"),
        mime_type: mime.to_string(),
        modified_time: Some(modified),
        size: None,
        parents: vec!["root".to_string()],
        trashed: false,
        payload: ExtensionPayload::new(json!({ "id": id })),
        synced_at: Utc::now(),
    }
}

pub fn spreadsheet(id: &str) -> Spreadsheet {
    Spreadsheet {
        id: id.to_string(),
        title: format!("Sheet {id}"),
        modified_time: None,
        sheet_titles: vec!["Summary".to_string()],
        payload: ExtensionPayload::empty(),
    }
}

pub fn document(id: &str) -> Document {
    Document {
        id: id.to_string(),
        title: format!("Doc {id}"),
        modified_time: None,
        body_text: "Hello".to_string(),
        payload: ExtensionPayload::empty(),
    }
}

pub fn server_error() -> RemoteError {
    RemoteError::Http {
        status: 500,
        message: "Backend Error".to_string(),
    }
}

// ============================================================================
// Calendar fake
// ============================================================================

/// Pauses `list_calendars` until released
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeCalendarApi {
    list_pages: Scripted<Change<RemoteCollection>>,
    event_pages: Mutex<HashMap<String, VecDeque<Result<Page<Change<CalendarEvent>>, RemoteError>>>>,
    remote_events: Mutex<HashMap<(String, String), CalendarEvent>>,
    list_requests: Mutex<Vec<ListRequest>>,
    event_requests: Mutex<Vec<(String, ListRequest)>>,
    item_calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeCalendarApi {
    pub fn push_list_page(&self, page: Result<Page<Change<RemoteCollection>>, RemoteError>) {
        self.list_pages.lock().unwrap().push_back(page);
    }

    pub fn push_events_page(
        &self,
        calendar: &str,
        page: Result<Page<Change<CalendarEvent>>, RemoteError>,
    ) {
        self.event_pages
            .lock()
            .unwrap()
            .entry(calendar.to_string())
            .or_default()
            .push_back(page);
    }

    /// Makes `get_event` find this event
    pub fn put_remote_event(&self, event: CalendarEvent) {
        self.remote_events.lock().unwrap().insert(
            (event.calendar_id.to_string(), event.id.clone()),
            event,
        );
    }

    pub fn set_gate(&self, gate: Arc<Gate>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn list_requests(&self) -> Vec<ListRequest> {
        self.list_requests.lock().unwrap().clone()
    }

    pub fn event_requests(&self) -> Vec<(String, ListRequest)> {
        self.event_requests.lock().unwrap().clone()
    }

    pub fn event_requests_for(&self, calendar: &str) -> Vec<ListRequest> {
        self.event_requests()
            .into_iter()
            .filter(|(id, _)| id == calendar)
            .map(|(_, request)| request)
            .collect()
    }

    pub fn item_calls(&self) -> Vec<String> {
        self.item_calls.lock().unwrap().clone()
    }

    /// Every call that reached the fake
    pub fn total_calls(&self) -> usize {
        self.list_requests().len() + self.event_requests().len() + self.item_calls().len()
    }
}

#[async_trait]
impl ICalendarApi for FakeCalendarApi {
    async fn list_calendars(
        &self,
        request: &ListRequest,
    ) -> Result<Page<Change<RemoteCollection>>, RemoteError> {
        self.list_requests.lock().unwrap().push(request.clone());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.list_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::new(Vec::new()).with_sync_token(token(DEFAULT_LIST_TOKEN))))
    }

    async fn list_events(
        &self,
        calendar_id: &CollectionId,
        request: &ListRequest,
    ) -> Result<Page<Change<CalendarEvent>>, RemoteError> {
        self.event_requests
            .lock()
            .unwrap()
            .push((calendar_id.to_string(), request.clone()));
        self.event_pages
            .lock()
            .unwrap()
            .get_mut(calendar_id.as_str())
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Ok(Page::new(Vec::new()).with_sync_token(token(DEFAULT_EVENTS_TOKEN)))
            })
    }

    async fn get_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<CalendarEvent, RemoteError> {
        self.item_calls
            .lock()
            .unwrap()
            .push(format!("get:{calendar_id}:{event_id}"));
        self.remote_events
            .lock()
            .unwrap()
            .get(&(calendar_id.to_string(), event_id.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("event {event_id}")))
    }

    async fn create_event(
        &self,
        calendar_id: &CollectionId,
        body: &serde_json::Value,
    ) -> Result<CalendarEvent, RemoteError> {
        self.item_calls
            .lock()
            .unwrap()
            .push(format!("create:{calendar_id}"));
        let mut created = event(calendar_id.as_str(), "created-1", 2);
        created.summary = body["summary"].as_str().map(str::to_string);
        created.updated = Some(Utc::now());
        Ok(created)
    }

    async fn update_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
        patch: &serde_json::Value,
    ) -> Result<CalendarEvent, RemoteError> {
        self.item_calls
            .lock()
            .unwrap()
            .push(format!("update:{calendar_id}:{event_id}"));
        let mut updated = self.get_event(calendar_id, event_id).await?;
        if let Some(summary) = patch["summary"].as_str() {
            updated.summary = Some(summary.to_string());
        }
        updated.updated = Some(Utc::now());
        Ok(updated)
    }

    async fn delete_event(&self, calendar_id: &CollectionId, event_id: &str) -> Result<(), RemoteError> {
        self.item_calls
            .lock()
            .unwrap()
            .push(format!("delete:{calendar_id}:{event_id}"));
        Ok(())
    }
}

// ============================================================================
// Drive fake
// ============================================================================

#[derive(Default)]
pub struct FakeDriveApi {
    change_pages: Scripted<Change<DriveFile>>,
    file_pages: Scripted<DriveFile>,
    start_token_error: Mutex<Option<RemoteError>>,
    remote_files: Mutex<HashMap<String, DriveFile>>,
    spreadsheets: Mutex<HashMap<String, Spreadsheet>>,
    documents: Mutex<HashMap<String, Document>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<ListRequest>>,
}

impl FakeDriveApi {
    pub fn push_changes_page(&self, page: Result<Page<Change<DriveFile>>, RemoteError>) {
        self.change_pages.lock().unwrap().push_back(page);
    }

    pub fn push_files_page(&self, page: Result<Page<DriveFile>, RemoteError>) {
        self.file_pages.lock().unwrap().push_back(page);
    }

    /// Fails the next `start_page_token` call
    pub fn fail_start_token(&self, error: RemoteError) {
        *self.start_token_error.lock().unwrap() = Some(error);
    }

    pub fn put_remote_file(&self, file: DriveFile) {
        self.remote_files.lock().unwrap().insert(file.id.clone(), file);
    }

    pub fn put_spreadsheet(&self, sheet: Spreadsheet) {
        self.spreadsheets.lock().unwrap().insert(sheet.id.clone(), sheet);
    }

    pub fn put_document(&self, doc: Document) {
        self.documents.lock().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<ListRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IDriveApi for FakeDriveApi {
    async fn start_page_token(&self) -> Result<String, RemoteError> {
        self.record("start_page_token".to_string());
        match self.start_token_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(START_PAGE_TOKEN.to_string()),
        }
    }

    async fn list_changes(&self, request: &ListRequest) -> Result<Page<Change<DriveFile>>, RemoteError> {
        self.record(format!(
            "list_changes:{}",
            request.page_token.as_deref().unwrap_or("")
        ));
        self.requests.lock().unwrap().push(request.clone());
        self.change_pages.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Page::new(Vec::new()).with_sync_token(token(DEFAULT_CHANGES_TOKEN)))
        })
    }

    async fn list_files(&self, request: &ListRequest) -> Result<Page<DriveFile>, RemoteError> {
        self.record("list_files".to_string());
        self.requests.lock().unwrap().push(request.clone());
        self.file_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::new(Vec::new())))
    }

    async fn get_file(&self, file_id: &str) -> Result<DriveFile, RemoteError> {
        self.record(format!("get_file:{file_id}"));
        self.remote_files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("file {file_id}")))
    }

    async fn get_spreadsheet(&self, file_id: &str) -> Result<Spreadsheet, RemoteError> {
        self.record(format!("get_spreadsheet:{file_id}"));
        self.spreadsheets
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("spreadsheet {file_id}")))
    }

    async fn get_document(&self, file_id: &str) -> Result<Document, RemoteError> {
        self.record(format!("get_document:{file_id}"));
        self.documents
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("document {file_id}")))
    }
}

// ============================================================================
// Credentials
// ============================================================================

pub struct FakeCredentials {
    credential: Mutex<Option<Credential>>,
}

impl FakeCredentials {
    pub fn connected() -> Self {
        Self {
            credential: Mutex::new(Some(Credential::bearer("test-token"))),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            credential: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ICredentialProvider for FakeCredentials {
    async fn get_credential(&self) -> anyhow::Result<Option<Credential>> {
        Ok(self.credential.lock().unwrap().clone())
    }

    async fn revoke(&self) -> anyhow::Result<()> {
        *self.credential.lock().unwrap() = None;
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Calendar-only settings with generous budgets
pub fn settings() -> SyncSettings {
    SyncSettings {
        drive_enabled: false,
        ..SyncSettings::default()
    }
}

pub struct Harness {
    _pool: DatabasePool,
    pub store: Arc<SqliteLocalStore>,
    pub calendar: Arc<FakeCalendarApi>,
    pub drive: Arc<FakeDriveApi>,
    pub ctx: Arc<SyncContext>,
}

impl Harness {
    pub async fn new(settings: SyncSettings) -> Self {
        Self::build(settings, FakeCredentials::connected()).await
    }

    pub async fn disconnected(settings: SyncSettings) -> Self {
        Self::build(settings, FakeCredentials::disconnected()).await
    }

    async fn build(settings: SyncSettings, credentials: FakeCredentials) -> Self {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        let calendar = Arc::new(FakeCalendarApi::default());
        let drive = Arc::new(FakeDriveApi::default());
        let ctx = Arc::new(SyncContext::new(
            store.clone(),
            calendar.clone(),
            drive.clone(),
            Arc::new(credentials),
            settings,
        ));
        Self {
            _pool: pool,
            store,
            calendar,
            drive,
            ctx,
        }
    }

    pub async fn seed_collections(&self, collections: &[RemoteCollection]) {
        self.store.upsert_collections(collections).await.unwrap();
    }

    pub async fn seed_events(&self, calendar: &str, events: Vec<CalendarEvent>) {
        let changes: Vec<_> = events.into_iter().map(Change::Upsert).collect();
        self.store
            .apply_event_changes(&cal(calendar), &changes)
            .await
            .unwrap();
    }

    pub async fn state(&self, key: &str) -> Option<String> {
        self.store.get_state(key).await.unwrap()
    }

    pub async fn set_state(&self, key: &str, value: &str) {
        self.store.set_state(key, value).await.unwrap();
    }

    pub async fn event_ids(&self, calendar: &str) -> Vec<String> {
        let range = skillsync_core::domain::TimeRange::new(day(-3650), day(3650)).unwrap();
        self.store
            .query_events(&cal(calendar), &range)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect()
    }
}
