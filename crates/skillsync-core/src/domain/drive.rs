//! Drive files and the spreadsheet/document details derived from them
//!
//! Drive files form a flat namespace (no per-collection grouping). Files
//! whose MIME type is a native spreadsheet or document additionally get a
//! detail row fetched from the Sheets/Docs endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::ExtensionPayload;

/// MIME type of native spreadsheets
pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// MIME type of native documents
pub const DOCUMENT_MIME: &str = "application/vnd.google-apps.document";

/// MIME type of folders
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// A Drive file's metadata as cached locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub size: Option<i64>,
    pub parents: Vec<String>,
    pub trashed: bool,
    pub payload: ExtensionPayload,
    pub synced_at: DateTime<Utc>,
}

impl DriveFile {
    /// Which detail row, if any, this file should have
    pub fn content_kind(&self) -> Option<ContentKind> {
        ContentKind::from_mime(&self.mime_type)
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// Detail entity derived from a Drive file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Spreadsheet,
    Document,
}

impl ContentKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            SPREADSHEET_MIME => Some(ContentKind::Spreadsheet),
            DOCUMENT_MIME => Some(ContentKind::Document),
            _ => None,
        }
    }
}

/// A file whose detail row is missing or older than the file itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub file_id: String,
    pub kind: ContentKind,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Spreadsheet metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spreadsheet {
    pub id: String,
    pub title: String,
    /// Copied from the Drive file; the Sheets endpoint does not report it
    pub modified_time: Option<DateTime<Utc>>,
    pub sheet_titles: Vec<String>,
    pub payload: ExtensionPayload,
}

/// Document metadata plus its flattened plain text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub body_text: String,
    pub payload: ExtensionPayload,
}
