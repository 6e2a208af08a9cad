//! Integration tests for the authenticated fetch client

use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use skillsync_core::ports::{Credential, RateLimitState, RemoteError};
use skillsync_google::{ApiClient, FetchOptions, StaticCredentialProvider};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_fetch_sends_bearer_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(query_param("maxResults", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()));
    let value: Value = client
        .fetch(
            Method::GET,
            "/users/me/calendarList",
            FetchOptions::new().query("maxResults", 10),
        )
        .await
        .unwrap();

    assert_eq!(value, json!({ "items": [] }));
}

#[tokio::test]
async fn test_fetch_sends_json_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(header("x-goog-request-reason", "test"))
        .and(body_json(json!({ "summary": "Lunch" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "e1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()));
    let value: Value = client
        .fetch(
            Method::POST,
            "/calendars/primary/events",
            FetchOptions::new()
                .body(json!({ "summary": "Lunch" }))
                .header("X-Goog-Request-Reason", "test"),
        )
        .await
        .unwrap();

    assert_eq!(value["id"], "e1");
}

#[tokio::test]
async fn test_missing_credential_is_not_connected_without_request() {
    let server = MockServer::start().await;
    let client = ApiClient::new(server.uri(), Arc::new(StaticCredentialProvider::empty()));

    let err = client
        .fetch::<Value>(Method::GET, "/anything", FetchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err, RemoteError::NotConnected);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_credential_is_unauthorized() {
    let server = MockServer::start().await;
    let credential = Credential {
        access_token: "old".to_string(),
        expires_at: Some(Utc::now() - Duration::minutes(5)),
    };
    let client = ApiClient::new(
        server.uri(),
        Arc::new(StaticCredentialProvider::from_credential(credential)),
    );

    let err = client
        .fetch::<Value>(Method::GET, "/anything", FetchOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Unauthorized(_)));
}

#[tokio::test]
async fn test_429_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;

    let state = Arc::new(RateLimitState::new());
    let client = common::client(&server, state.clone());
    let value: Value = client
        .fetch(Method::GET, "/files", FetchOptions::new())
        .await
        .unwrap();

    assert_eq!(value, json!({ "files": [] }));
    let snapshot = state.snapshot();
    assert_eq!(snapshot.throttled, 1);
    assert_eq!(snapshot.last_retry_after_secs, Some(0));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_429_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()));
    let err = client
        .fetch::<Value>(Method::GET, "/files", FetchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::RateLimited {
            retry_after_secs: Some(0)
        }
    );
    // first attempt plus one retry
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_long_retry_after_is_returned_without_sleeping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "86400"))
        .mount(&server)
        .await;

    let state = Arc::new(RateLimitState::new());
    let client = common::client(&server, state.clone())
        .with_max_retries(3)
        .with_max_retry_wait(std::time::Duration::from_secs(5));
    let err = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        client.fetch::<Value>(Method::GET, "/files", FetchOptions::new()),
    )
    .await
    .expect("fetch must not sleep through a day-long Retry-After")
    .unwrap_err();

    assert_eq!(
        err,
        RemoteError::RateLimited {
            retry_after_secs: Some(3600)
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(state.snapshot().throttled, 1);
}

#[tokio::test]
async fn test_retries_stop_when_total_wait_exceeds_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()))
        .with_max_retries(5)
        .with_max_retry_wait(std::time::Duration::from_secs(1));
    let err = client
        .fetch::<Value>(Method::GET, "/files", FetchOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::RateLimited { .. }));
    // one 1s backoff fits the bound, the second does not
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_headers_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "17")
                .insert_header("X-RateLimit-Reset", "1792152000")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let state = Arc::new(RateLimitState::new());
    let client = common::client(&server, state.clone());
    let _: Value = client
        .fetch(Method::GET, "/files", FetchOptions::new())
        .await
        .unwrap();

    let snapshot = state.snapshot();
    assert_eq!(snapshot.remaining, Some(17));
    assert_eq!(snapshot.reset_at.map(|t| t.timestamp()), Some(1_792_152_000));
}

#[tokio::test]
async fn test_error_body_classification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/holidays/events"))
        .respond_with(ResponseTemplate::new(400).set_body_json(common::vendor_error(
            400,
            "notSupported",
            "Operation not supported",
        )))
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()));
    let err = client
        .fetch::<Value>(Method::GET, "/calendars/holidays/events", FetchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::Unsupported("Operation not supported".to_string())
    );
}

#[tokio::test]
async fn test_invalid_json_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()));
    let err = client
        .fetch::<Value>(Method::GET, "/files", FetchOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_fetch_envelope_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "a": 1 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(common::vendor_error(
            404, "notFound", "Not Found",
        )))
        .mount(&server)
        .await;

    let client = common::client(&server, Arc::new(RateLimitState::new()));

    let ok = client
        .fetch_envelope(Method::GET, "/ok", FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(ok, json!({ "success": true, "data": { "a": 1 } }));

    let missing = client
        .fetch_envelope(Method::GET, "/missing", FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(missing["success"], false);
    assert_eq!(missing["error"]["code"], "not_found");

    let internal = client
        .fetch_envelope(
            Method::GET,
            "/ok",
            FetchOptions::new().base_url("not a url"),
        )
        .await;
    assert!(matches!(internal, Err(RemoteError::Config(_))));
}

#[tokio::test]
async fn test_network_failure_is_classified() {
    // Nothing listens on this port once the server is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let client = ApiClient::new(uri, common::credentials());

    let err = client
        .fetch::<Value>(Method::GET, "/files", FetchOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Network(_)));
}
