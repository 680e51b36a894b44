//! Wire-contract tests for the bearer-token HTTP transport.

use fieldsync_engine::{
    field_ops_policy, HttpConfig, HttpTransport, SnapshotFilter, SnapshotTransport, SyncError,
    SyncSnapshot,
};
use fieldsync_types::{DeviceId, EntityKind, SyncableRecord, UpdatedAt};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(HttpConfig::new(server.uri(), "sekrit")).unwrap()
}

fn snapshot(device: DeviceId) -> SyncSnapshot {
    let filter = SnapshotFilter::new(Arc::new(field_ops_policy()));
    let records = vec![SyncableRecord::new("c1")
        .with_field("name", json!("Acme"))
        .with_updated_at(UpdatedAt::new(1_000, 0))];
    SyncSnapshot::build(EntityKind::Customer, device, &records, &filter).unwrap()
}

#[tokio::test]
async fn push_posts_the_upload_action_with_the_token() {
    let server = MockServer::start().await;
    let device = DeviceId::new();

    Mock::given(method("POST"))
        .and(query_param("action", "upload"))
        .and(header("X-Auth-Token", "sekrit"))
        .and(body_partial_json(json!({
            "customers": [{"id": "c1", "name": "Acme"}],
            "deviceId": device.to_string(),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server).push(&snapshot(device)).await.unwrap();
}

#[tokio::test]
async fn pull_parses_the_latest_payload() {
    let server = MockServer::start().await;
    let device = DeviceId::new();

    Mock::given(method("GET"))
        .and(query_param("action", "latest"))
        .and(header("X-Auth-Token", "sekrit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "customers": [
                    {"id": "c1", "name": "Acme", "updatedAt": {"wall_ms": 1000, "counter": 0}}
                ],
                "timestamp": 5000,
                "deviceId": device.to_string(),
            }
        })))
        .mount(&server)
        .await;

    let pulled = transport(&server)
        .pull(EntityKind::Customer)
        .await
        .unwrap()
        .expect("snapshot should be present");

    assert_eq!(pulled.records.len(), 1);
    assert_eq!(pulled.records[0].id, "c1");
    assert_eq!(pulled.timestamp.wall_ms(), 5000);
    assert_eq!(pulled.device_id, device);
}

#[tokio::test]
async fn pull_treats_error_body_as_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("action", "latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "no data yet"})),
        )
        .mount(&server)
        .await;

    let pulled = transport(&server).pull(EntityKind::Customer).await.unwrap();
    assert!(pulled.is_none());
}

#[tokio::test]
async fn pull_without_the_kind_key_is_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("action", "latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"jobs": [], "timestamp": 1, "deviceId": "x"}
        })))
        .mount(&server)
        .await;

    let pulled = transport(&server).pull(EntityKind::Customer).await.unwrap();
    assert!(pulled.is_none());
}

#[tokio::test]
async fn rejected_token_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(query_param("action", "upload"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("action", "latest"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let transport = transport(&server);
    let push = transport.push(&snapshot(DeviceId::new())).await.unwrap_err();
    assert!(matches!(push, SyncError::Auth(_)));

    let pull = transport.pull(EntityKind::Customer).await.unwrap_err();
    assert!(matches!(pull, SyncError::Auth(_)));
}

#[tokio::test]
async fn malformed_latest_body_is_a_malformed_data_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("action", "latest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = transport(&server).pull(EntityKind::Customer).await.unwrap_err();
    assert!(matches!(err, SyncError::MalformedRemoteData(_)));
}
