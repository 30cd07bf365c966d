#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end checks of the client stack against a local mock backend.

use std::io::Write;
use std::time::Duration;

use depot_http::{HttpClientBuilder, HttpClientConfig, HttpError};
use flate2::Compression;
use flate2::write::GzEncoder;
use httpmock::prelude::*;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("depot_http=debug")
        .with_test_writer()
        .try_init();
}

fn test_builder() -> HttpClientBuilder {
    HttpClientBuilder::with_config(HttpClientConfig::for_testing())
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn gzip_response_is_decompressed() {
    init_tracing();
    let server = MockServer::start();
    let payload = json!({
        "success": true,
        "data": [{"id": "w-1", "name": "North DC"}, {"id": "w-2", "name": "South DC"}]
    });
    let _m = server.mock(|when, then| {
        when.method(GET).path("/warehouses");
        then.status(200)
            .header("content-type", "application/json")
            .header("content-encoding", "gzip")
            .body(gzip(payload.to_string().as_bytes()));
    });

    let client = test_builder().build().unwrap();
    let body: serde_json::Value = client
        .get(&server.url("/warehouses"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, payload);
}

#[tokio::test]
async fn body_limit_applies_to_decompressed_bytes() {
    init_tracing();
    let server = MockServer::start();
    let expanded = vec![b'a'; 256 * 1024];
    let compressed = gzip(&expanded);
    assert!(compressed.len() < 4096);

    let _m = server.mock(|when, then| {
        when.method(GET).path("/audit-logs");
        then.status(200)
            .header("content-encoding", "gzip")
            .body(compressed.clone());
    });

    let client = test_builder()
        .max_body_size(64 * 1024)
        .build()
        .unwrap();
    let err = client
        .get(&server.url("/audit-logs"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::BodyTooLarge { limit, .. } if limit == 64 * 1024));
}

#[tokio::test]
async fn default_headers_reach_the_backend() {
    init_tracing();
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET)
            .path("/access-requests")
            .header("accept", "application/json")
            .header_exists("user-agent")
            .header_exists("accept-encoding");
        then.status(200).json_body(json!({"success": true, "data": []}));
    });

    let client = test_builder().build().unwrap();
    client
        .get(&server.url("/access-requests"))
        .send()
        .await
        .unwrap();
    m.assert();
}

#[tokio::test]
async fn server_error_passes_through_as_response() {
    init_tracing();
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(POST).path("/dispatch-orders");
        then.status(500)
            .json_body(json!({"success": false, "message": "database unavailable"}));
    });

    let client = test_builder().build().unwrap();
    let resp = client
        .post(&server.url("/dispatch-orders"))
        .json(&json!({"warehouseId": "w-1"}))
        .unwrap()
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);

    let err = resp.error_for_status().unwrap_err();
    assert_eq!(err.status(), Some(http::StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    init_tracing();
    let client = test_builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    // port 9 (discard) on localhost is expected to refuse connections
    let err = client
        .get("http://127.0.0.1:9/vendors")
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Transport(_) | HttpError::Timeout(_)));
}
