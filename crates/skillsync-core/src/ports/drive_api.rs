//! Drive vendor port (driven/secondary port)
//!
//! Drive has two listing shapes:
//! - `list_files` walks files modified after `ListRequest::time_min` (full mode)
//! - `list_changes` walks the change log starting at `ListRequest::page_token`
//!   (incremental mode). Every page token of the change log is itself a valid
//!   resume point; the last page carries the next start token in
//!   `Page::next_sync_token`.

use async_trait::async_trait;

use crate::domain::{Change, Document, DriveFile, Spreadsheet};
use crate::ports::remote::{ListRequest, Page, RemoteError};

#[async_trait]
pub trait IDriveApi: Send + Sync {
    /// Current change-log position; capture before a full listing
    async fn start_page_token(&self) -> Result<String, RemoteError>;

    async fn list_changes(
        &self,
        request: &ListRequest,
    ) -> Result<Page<Change<DriveFile>>, RemoteError>;

    async fn list_files(&self, request: &ListRequest) -> Result<Page<DriveFile>, RemoteError>;

    async fn get_file(&self, file_id: &str) -> Result<DriveFile, RemoteError>;

    async fn get_spreadsheet(&self, file_id: &str) -> Result<Spreadsheet, RemoteError>;

    async fn get_document(&self, file_id: &str) -> Result<Document, RemoteError>;
}
