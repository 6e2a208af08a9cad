//! Shared test helpers for Google API integration tests
//!
//! Each helper returns an adapter pointing at a fresh wiremock server.

use std::sync::Arc;

use skillsync_core::ports::{ICredentialProvider, RateLimitState};
use skillsync_google::{
    ApiClient, GoogleCalendarApi, GoogleDriveApi, StaticCredentialProvider,
};
use wiremock::MockServer;

pub const TOKEN: &str = "test-access-token";

pub fn credentials() -> Arc<dyn ICredentialProvider> {
    Arc::new(StaticCredentialProvider::new(TOKEN))
}

/// Client against `server` with a shared rate-limit state and one retry
pub fn client(server: &MockServer, state: Arc<RateLimitState>) -> ApiClient {
    ApiClient::new(server.uri(), credentials())
        .with_rate_limit_state(state)
        .with_max_retries(1)
}

pub async fn setup_calendar_mock() -> (MockServer, GoogleCalendarApi) {
    let server = MockServer::start().await;
    let api = GoogleCalendarApi::new(client(&server, Arc::new(RateLimitState::new())));
    (server, api)
}

/// Drive, Sheets and Docs all served by one mock under different prefixes
pub async fn setup_drive_mock() -> (MockServer, GoogleDriveApi) {
    let server = MockServer::start().await;
    let api = GoogleDriveApi::new(
        client(&server, Arc::new(RateLimitState::new())),
        format!("{}/sheets/v4", server.uri()),
        format!("{}/docs/v1", server.uri()),
    );
    (server, api)
}

pub fn vendor_error(code: u16, reason: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "errors": [ { "reason": reason, "message": message } ]
        }
    })
}
