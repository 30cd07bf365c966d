#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use depot_auth::{
    BroadcastExpiryHandler, FileTokenStore, MemoryTokenStore, RefreshError, SecretString,
    TokenPair,
};
use depot_http::HttpClientConfig;
use depot_sdk::{ApiError, ConsoleClient, ListQuery, ResourceKind, TokenStore};
use futures::{StreamExt, TryStreamExt};
use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::json;
use url::Url;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Vendor {
    id: String,
    name: String,
    gst_number: Option<String>,
}

fn client_with(server: &MockServer, store: Arc<dyn TokenStore>) -> ConsoleClient {
    ConsoleClient::builder(Url::parse(&server.url("/api")).unwrap())
        .http_config(HttpClientConfig::for_testing())
        .token_store(store)
        .build()
        .unwrap()
}

fn logged_in() -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new("T1", "R1")))
}

#[tokio::test]
async fn login_stores_tokens_and_profile() {
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST)
            .path("/api/auth/login")
            .json_body(json!({"email": "asha@depot.example", "password": "hunter2"}));
        then.status(200).json_body(json!({
            "success": true,
            "data": {
                "accessToken": "T1",
                "refreshToken": "R1",
                "user": {
                    "_id": "u-1",
                    "name": "Asha Rao",
                    "email": "asha@depot.example",
                    "role": "admin",
                    "permissions": ["vendors:write"]
                }
            }
        }));
    });

    let store = Arc::new(MemoryTokenStore::new());
    let client = client_with(&server, store.clone());
    let user = client
        .login("asha@depot.example", &SecretString::new("hunter2"))
        .await
        .unwrap();

    login.assert();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.role.as_deref(), Some("admin"));
    assert!(client.is_authenticated());
    assert_eq!(store.access_token().unwrap().expose(), "T1");
    assert_eq!(store.refresh_token().unwrap().expose(), "R1");
    assert_eq!(client.current_user().unwrap().name, "Asha Rao");
}

#[tokio::test]
async fn rejected_login_does_not_trigger_refresh() {
    let server = MockServer::start();
    let _login = server.mock(|when, then| {
        when.method(POST).path("/api/auth/login");
        then.status(401)
            .json_body(json!({"success": false, "message": "Invalid email or password"}));
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/api/auth/refresh");
        then.status(200);
    });

    let client = client_with(&server, logged_in());
    let err = client
        .login("asha@depot.example", &SecretString::new("wrong"))
        .await
        .unwrap_err();

    match err {
        ApiError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    refresh.assert_calls(0);
}

#[tokio::test]
async fn logout_clears_session_even_when_server_fails() {
    let server = MockServer::start();
    let logout = server.mock(|when, then| {
        when.method(POST)
            .path("/api/auth/logout")
            .header("authorization", "Bearer T1")
            .json_body(json!({"refreshToken": "R1"}));
        then.status(503);
    });

    let store = logged_in();
    let client = client_with(&server, store.clone());
    client.logout().await.unwrap();

    logout.assert();
    assert!(!client.is_authenticated());
    assert!(store.refresh_token().is_none());
}

#[tokio::test]
async fn list_sends_query_and_reads_pagination() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/api/vendors")
            .query_param("page", "2")
            .query_param("limit", "2")
            .query_param("search", "acme")
            .query_param("status", "active")
            .header("authorization", "Bearer T1");
        then.status(200).json_body(json!({
            "success": true,
            "data": [
                {"id": "v-3", "name": "Acme Logistics", "gstNumber": "29ABCDE1234F1Z5"},
                {"id": "v-4", "name": "Acme Cold Chain"}
            ],
            "pagination": {"page": 2, "limit": 2, "total": 5, "totalPages": 3}
        }));
    });

    let client = client_with(&server, logged_in());
    let page = client
        .resource(ResourceKind::Vendors)
        .list::<Vendor>(
            &ListQuery::new()
                .page(2)
                .limit(2)
                .search("acme")
                .filter("status", "active"),
        )
        .await
        .unwrap();

    list.assert();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].gst_number.as_deref(), Some("29ABCDE1234F1Z5"));
    assert_eq!(page.items[1].gst_number, None);
    assert!(page.has_next());
}

#[tokio::test]
async fn pages_walks_until_last_page() {
    let server = MockServer::start();
    for page in 1..=3u32 {
        let _page_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/warehouses")
                .query_param("page", page.to_string());
            then.status(200).json_body(json!({
                "success": true,
                "data": [{"id": format!("w-{page}")}],
                "pagination": {"page": page, "limit": 1, "total": 3, "totalPages": 3}
            }));
        });
    }

    let client = client_with(&server, logged_in());
    let pages: Vec<_> = client
        .resource(ResourceKind::Warehouses)
        .pages::<serde_json::Value>(ListQuery::new().limit(1))
        .try_collect()
        .await
        .unwrap();

    let ids: Vec<_> = pages
        .iter()
        .flat_map(|p| p.items.iter().map(|v| v["id"].as_str().unwrap().to_owned()))
        .collect();
    assert_eq!(ids, ["w-1", "w-2", "w-3"]);
}

#[tokio::test]
async fn pages_stop_when_backend_repeats_first_page() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path("/api/vendors");
        then.status(200).json_body(json!({
            "success": true,
            "data": [{"id": "v-1"}],
            "pagination": {"page": 1, "limit": 1, "total": 3, "totalPages": 3}
        }));
    });

    let client = client_with(&server, logged_in());
    let pages: Vec<_> = client
        .resource(ResourceKind::Vendors)
        .pages::<serde_json::Value>(ListQuery::new().limit(1))
        .take(25)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    list.assert_calls(2);
}

#[tokio::test]
async fn crud_round_trip() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/api/vendors")
            .json_body(json!({"name": "Northwind Traders"}));
        then.status(201).json_body(json!({
            "success": true,
            "data": {"id": "v-9", "name": "Northwind Traders"}
        }));
    });
    let get = server.mock(|when, then| {
        when.method(GET).path("/api/vendors/v-9");
        then.status(200).json_body(json!({
            "success": true,
            "data": {"id": "v-9", "name": "Northwind Traders"}
        }));
    });
    let update = server.mock(|when, then| {
        when.method(PUT)
            .path("/api/vendors/v-9")
            .json_body(json!({"name": "Northwind Traders Ltd"}));
        then.status(200).json_body(json!({
            "success": true,
            "data": {"id": "v-9", "name": "Northwind Traders Ltd"}
        }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/api/vendors/v-9");
        then.status(204);
    });

    let client = client_with(&server, logged_in());
    let vendors = client.resource(ResourceKind::Vendors);

    let created: Vendor = vendors
        .create(&json!({"name": "Northwind Traders"}))
        .await
        .unwrap();
    assert_eq!(created.id, "v-9");

    let fetched: Vendor = vendors.get("v-9").await.unwrap();
    assert_eq!(fetched, created);

    let updated: Vendor = vendors
        .update("v-9", &json!({"name": "Northwind Traders Ltd"}))
        .await
        .unwrap();
    assert_eq!(updated.name, "Northwind Traders Ltd");

    vendors.delete("v-9").await.unwrap();

    create.assert();
    get.assert();
    update.assert();
    delete.assert();
}

#[tokio::test]
async fn audit_logs_reject_mutations_client_side() {
    let server = MockServer::start();
    let client = client_with(&server, logged_in());
    let audit = client.resource(ResourceKind::AuditLogs);
    let err = audit
        .create::<_, serde_json::Value>(&json!({"action": "forged"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ReadOnly(ResourceKind::AuditLogs)));
    assert!(matches!(
        audit.delete("log-1").await.unwrap_err(),
        ApiError::ReadOnly(_)
    ));
    assert!(matches!(
        audit.update::<_, serde_json::Value>("log-1", &json!({})).await.unwrap_err(),
        ApiError::ReadOnly(_)
    ));
}

#[tokio::test]
async fn backend_message_surfaces_on_conflict() {
    let server = MockServer::start();
    let _conflict = server.mock(|when, then| {
        when.method(POST).path("/api/warehouses");
        then.status(409).json_body(json!({
            "success": false,
            "message": "Warehouse code already exists"
        }));
    });

    let client = client_with(&server, logged_in());
    let err = client
        .resource(ResourceKind::Warehouses)
        .create::<_, serde_json::Value>(&json!({"code": "BLR-1"}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(http::StatusCode::CONFLICT));
    assert_eq!(err.to_string(), "409 Conflict: Warehouse code already exists");
}

#[tokio::test]
async fn non_envelope_error_keeps_status() {
    let server = MockServer::start();
    let _bad_gateway = server.mock(|when, then| {
        when.method(GET).path("/api/permissions");
        then.status(502).body("<html>bad gateway</html>");
    });

    let client = client_with(&server, logged_in());
    let err = client
        .resource(ResourceKind::Permissions)
        .list::<serde_json::Value>(&ListQuery::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http(_)));
    assert_eq!(err.status(), Some(http::StatusCode::BAD_GATEWAY));
}

#[tokio::test]
async fn expired_session_refreshes_then_profile_loads() {
    let server = MockServer::start();
    let _stale = server.mock(|when, then| {
        when.method(GET)
            .path("/api/auth/me")
            .header("authorization", "Bearer T1");
        then.status(401);
    });
    let fresh = server.mock(|when, then| {
        when.method(GET)
            .path("/api/auth/me")
            .header("authorization", "Bearer T2");
        then.status(200).json_body(json!({
            "success": true,
            "data": {"id": "u-7", "name": "Ravi", "email": "ravi@depot.example"}
        }));
    });
    let refresh = server.mock(|when, then| {
        when.method(POST)
            .path("/api/auth/refresh")
            .json_body(json!({"refreshToken": "R1"}));
        then.status(200).json_body(json!({
            "success": true,
            "data": {"accessToken": "T2", "refreshToken": "R2"}
        }));
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = Arc::new(FileTokenStore::open(&path).unwrap());
    store.set_tokens(&TokenPair::new("T1", "R1")).unwrap();

    let client = client_with(&server, store);
    let user = client.fetch_profile().await.unwrap();

    assert_eq!(user.id, "u-7");
    refresh.assert();
    fresh.assert();

    let reopened = FileTokenStore::open(&path).unwrap();
    assert_eq!(reopened.access_token().unwrap().expose(), "T2");
    assert_eq!(reopened.user().unwrap().email, "ravi@depot.example");
}

#[tokio::test]
async fn failed_refresh_reports_session_expired_to_subscribers() {
    let server = MockServer::start();
    let _stale = server.mock(|when, then| {
        when.method(GET).path("/api/dispatch-orders");
        then.status(401);
    });
    let _refresh = server.mock(|when, then| {
        when.method(POST).path("/api/auth/refresh");
        then.status(401)
            .delay(Duration::from_millis(50))
            .json_body(json!({"success": false, "message": "Refresh token revoked"}));
    });

    let events = BroadcastExpiryHandler::default();
    let mut rx = events.subscribe();
    let store = logged_in();
    let client = ConsoleClient::builder(Url::parse(&server.url("/api")).unwrap())
        .http_config(HttpClientConfig::for_testing())
        .token_store(store.clone())
        .on_session_expired(Arc::new(events))
        .build()
        .unwrap();

    let resource = client.resource(ResourceKind::DispatchOrders);
    let query = ListQuery::new();
    let (a, b) = tokio::join!(
        resource.list::<serde_json::Value>(&query),
        client.send_json(http::Method::GET, "/dispatch-orders", None),
    );
    assert!(a.unwrap_err().is_session_expired());
    assert!(b.unwrap_err().is_session_expired());

    let event = rx.recv().await.unwrap();
    assert_eq!(event.login_path, "/login");
    assert!(matches!(event.reason, RefreshError::Rejected(_)));
    assert!(rx.try_recv().is_err());
    assert!(store.access_token().is_none());
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn send_json_keeps_query_from_path() {
    let server = MockServer::start();
    let vendors = server.mock(|when, then| {
        when.method(GET)
            .path("/api/vendors")
            .query_param("status", "active")
            .header("authorization", "Bearer T1");
        then.status(200).json_body(json!({
            "success": true,
            "data": [{"id": "v-1"}]
        }));
    });

    let client = client_with(&server, logged_in());
    let data = client
        .send_json(http::Method::GET, "/vendors?status=active", None)
        .await
        .unwrap();

    vendors.assert();
    assert_eq!(data[0]["id"], "v-1");
}
