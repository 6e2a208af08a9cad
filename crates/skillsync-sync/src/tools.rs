//! Query tools
//!
//! [`SkillTools::call`] is the request/response surface handed to the agent
//! runtime. Every call returns JSON with a `success` discriminant:
//!
//! ```json
//! {"success": true, "data": ...}
//! {"success": false, "error": "Not found: event abc"}
//! ```
//!
//! Errors never escape as `Err`; they are rendered into the `error` string.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skillsync_core::domain::{Change, CollectionId, TimeRange};
use skillsync_core::ports::{FileFilter, RemoteError};
use tracing::{debug, warn};

use crate::cache_fill::CacheFill;
use crate::orchestrator::{RunRequest, RunStatus, SyncOrchestrator};
use crate::SyncError;

/// Names accepted by [`SkillTools::call`]
pub const TOOL_NAMES: &[&str] = &[
    "list_calendars",
    "list_events",
    "get_event",
    "create_event",
    "update_event",
    "delete_event",
    "list_files",
    "get_file",
    "get_spreadsheet",
    "get_document",
    "sync_now",
    "sync_status",
];

/// Default span of `list_events` when `time_max` is omitted
const DEFAULT_EVENT_WINDOW_DAYS: i64 = 7;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListEventsArgs {
    calendar_id: Option<String>,
    time_min: Option<DateTime<Utc>>,
    time_max: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EventArgs {
    calendar_id: Option<String>,
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateEventArgs {
    calendar_id: Option<String>,
    event: Value,
}

#[derive(Debug, Deserialize)]
struct UpdateEventArgs {
    calendar_id: Option<String>,
    event_id: String,
    patch: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListFilesArgs {
    name_contains: Option<String>,
    mime_type: Option<String>,
    modified_after: Option<DateTime<Utc>>,
    include_trashed: bool,
    limit: Option<u32>,
}

impl ListFilesArgs {
    fn into_filter(self) -> FileFilter {
        FileFilter {
            name_contains: self.name_contains,
            mime_type: self.mime_type,
            modified_after: self.modified_after,
            include_trashed: self.include_trashed,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    #[serde(alias = "id", alias = "spreadsheet_id", alias = "document_id")]
    file_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncNowArgs {
    calendar_id: Option<String>,
    force: bool,
    full: bool,
}

/// Decodes tool arguments; `null` counts as an empty object
fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, SyncError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| SyncError::InvalidRequest(format!("{tool}: {e}")))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, SyncError> {
    Ok(serde_json::to_value(value)?)
}

// ============================================================================
// SkillTools
// ============================================================================

#[derive(Clone)]
pub struct SkillTools {
    orchestrator: Arc<SyncOrchestrator>,
    fill: CacheFill,
}

impl SkillTools {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let fill = CacheFill::new(orchestrator.context().clone());
        Self { orchestrator, fill }
    }

    pub fn names() -> &'static [&'static str] {
        TOOL_NAMES
    }

    /// Runs tool `name`; always returns a `{success, data | error}` object
    #[tracing::instrument(skip(self, args))]
    pub async fn call(&self, name: &str, args: Value) -> Value {
        match self.dispatch(name, args).await {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(e) => {
                warn!(error = %e, "Tool call failed");
                json!({ "success": false, "error": e.to_string() })
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<Value, SyncError> {
        debug!("Dispatching tool");
        match name {
            "list_calendars" => to_data(&self.fill.list_calendars().await?),
            "list_events" => self.list_events(parse_args(name, args)?).await,
            "get_event" => {
                let args: EventArgs = parse_args(name, args)?;
                let calendar_id = self.fill.resolve_calendar(args.calendar_id.as_deref()).await?;
                match self.fill.get_event(&calendar_id, &args.event_id).await? {
                    Some(event) => to_data(&event),
                    None => Err(SyncError::NotFound(format!("event {}", args.event_id))),
                }
            }
            "create_event" => self.create_event(parse_args(name, args)?).await,
            "update_event" => self.update_event(parse_args(name, args)?).await,
            "delete_event" => self.delete_event(parse_args(name, args)?).await,
            "list_files" => {
                let args: ListFilesArgs = parse_args(name, args)?;
                to_data(&self.fill.list_files(&args.into_filter()).await?)
            }
            "get_file" => {
                let args: FileArgs = parse_args(name, args)?;
                match self.fill.get_file(&args.file_id).await? {
                    Some(file) => to_data(&file),
                    None => Err(SyncError::NotFound(format!("file {}", args.file_id))),
                }
            }
            "get_spreadsheet" => {
                let args: FileArgs = parse_args(name, args)?;
                match self.fill.get_spreadsheet(&args.file_id).await? {
                    Some(sheet) => to_data(&sheet),
                    None => Err(SyncError::NotFound(format!("spreadsheet {}", args.file_id))),
                }
            }
            "get_document" => {
                let args: FileArgs = parse_args(name, args)?;
                match self.fill.get_document(&args.file_id).await? {
                    Some(doc) => to_data(&doc),
                    None => Err(SyncError::NotFound(format!("document {}", args.file_id))),
                }
            }
            "sync_now" => self.sync_now(parse_args(name, args)?).await,
            "sync_status" => to_data(&self.orchestrator.status().await.to_flat_map()),
            other => Err(SyncError::InvalidRequest(format!("unknown tool: {other}"))),
        }
    }

    async fn list_events(&self, args: ListEventsArgs) -> Result<Value, SyncError> {
        let calendar_id = self.fill.resolve_calendar(args.calendar_id.as_deref()).await?;
        let start = args.time_min.unwrap_or_else(Utc::now);
        let end = args
            .time_max
            .unwrap_or_else(|| start + Duration::days(DEFAULT_EVENT_WINDOW_DAYS));
        let range = TimeRange::new(start, end)?;

        let read = self.fill.list_events(&calendar_id, &range).await?;
        Ok(json!({
            "calendar_id": calendar_id,
            "events": to_data(&read.events)?,
            "fetched": read.fetched,
            "retention_limited": read.retention_limited,
            "sync": read.pass.map(|p| p.outcome),
        }))
    }

    async fn create_event(&self, args: CreateEventArgs) -> Result<Value, SyncError> {
        if !args.event.is_object() {
            return Err(SyncError::InvalidRequest("event must be an object".into()));
        }
        let ctx = self.fill.context();
        let calendar_id = self.fill.resolve_calendar(args.calendar_id.as_deref()).await?;
        let event = ctx.calendar.create_event(&calendar_id, &args.event).await?;
        ctx.store
            .apply_event_changes(&calendar_id, &[Change::Upsert(event.clone())])
            .await?;
        to_data(&event)
    }

    async fn update_event(&self, args: UpdateEventArgs) -> Result<Value, SyncError> {
        if !args.patch.is_object() {
            return Err(SyncError::InvalidRequest("patch must be an object".into()));
        }
        let ctx = self.fill.context();
        let calendar_id = self.fill.resolve_calendar(args.calendar_id.as_deref()).await?;
        let event = ctx
            .calendar
            .update_event(&calendar_id, &args.event_id, &args.patch)
            .await?;
        ctx.store
            .apply_event_changes(&calendar_id, &[Change::Upsert(event.clone())])
            .await?;
        to_data(&event)
    }

    async fn delete_event(&self, args: EventArgs) -> Result<Value, SyncError> {
        let ctx = self.fill.context();
        let calendar_id = self.fill.resolve_calendar(args.calendar_id.as_deref()).await?;
        ctx.calendar.delete_event(&calendar_id, &args.event_id).await?;
        let removal = Change::Removed {
            id: args.event_id.clone(),
            updated: None,
        };
        ctx.store.apply_event_changes(&calendar_id, &[removal]).await?;
        Ok(json!({ "deleted": true, "event_id": args.event_id }))
    }

    async fn sync_now(&self, args: SyncNowArgs) -> Result<Value, SyncError> {
        let mut request = RunRequest::periodic();
        if let Some(id) = args.calendar_id.as_deref() {
            request.collection = Some(CollectionId::new(id)?);
        }
        request.force = args.force;
        request.full = args.full;

        let report = self.orchestrator.run(request).await;
        if report.status == RunStatus::NotConnected {
            return Err(RemoteError::NotConnected.into());
        }
        to_data(&report)
    }
}
