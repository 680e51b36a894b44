//! Drive transport behavior against a mocked Drive API.

use fieldsync_engine::{
    field_ops_policy, DriveConfig, DriveTransport, SnapshotFilter, SnapshotTransport, SyncError,
    SyncSnapshot,
};
use fieldsync_types::{DeviceId, EntityKind, SyncableRecord, UpdatedAt};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn transport(server: &MockServer) -> DriveTransport {
    let config = DriveConfig {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        api_base_url: server.uri(),
        oauth_base_url: server.uri(),
        ..DriveConfig::default()
    };
    let transport = DriveTransport::new(config).unwrap();
    transport.set_tokens("access".into(), Some("refresh".into())).await;
    transport
}

fn snapshot() -> SyncSnapshot {
    let filter = SnapshotFilter::new(Arc::new(field_ops_policy()));
    let records = vec![SyncableRecord::new("j1")
        .with_field("title", json!("Patio"))
        .with_updated_at(UpdatedAt::new(1_000, 0))];
    SyncSnapshot::build(EntityKind::Job, DeviceId::new(), &records, &filter).unwrap()
}

/// Folder exists, file exists: pull downloads and parses it.
#[tokio::test]
async fn pull_downloads_the_kind_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param_contains("q", "vnd.google-apps.folder"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"files": [{"id": "folder1"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param_contains("q", "jobs.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"files": [{"id": "file1"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/file1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "j1", "title": "Patio", "updatedAt": {"wall_ms": 1000, "counter": 0}}
        ])))
        .mount(&server)
        .await;

    let pulled = transport(&server)
        .await
        .pull(EntityKind::Job)
        .await
        .unwrap()
        .expect("file exists");
    assert_eq!(pulled.records.len(), 1);
    assert_eq!(pulled.records[0].get("title"), Some(&json!("Patio")));
}

/// No file for the kind yet: pull reports absent, not an error.
#[tokio::test]
async fn pull_of_an_unseen_kind_is_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": [{"id": "folder1"}]})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .mount(&server)
        .await;

    let pulled = transport(&server).await.pull(EntityKind::Job).await.unwrap();
    assert!(pulled.is_none());
}

/// First push of a kind creates the file via multipart upload.
#[tokio::test]
async fn push_creates_the_file_when_missing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param_contains("q", "vnd.google-apps.folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": [{"id": "folder1"}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param_contains("q", "jobs.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file1"})))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server).await.push(&snapshot()).await.unwrap();
}

/// Later pushes overwrite the existing file in place.
#[tokio::test]
async fn push_overwrites_the_existing_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param_contains("q", "vnd.google-apps.folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": [{"id": "folder1"}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param_contains("q", "jobs.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": [{"id": "file1"}]})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/file1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file1"})))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server).await.push(&snapshot()).await.unwrap();
}

/// A rejected token on the folder search is an auth error, same as
/// on every other Drive call.
#[tokio::test]
async fn rejected_token_on_folder_search_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Invalid Credentials"}
        })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .await
        .pull(EntityKind::Job)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)));
}

/// Without tokens every call fails closed with an auth error.
#[tokio::test]
async fn unauthenticated_transport_fails_with_auth_error() {
    let server = MockServer::start().await;
    let config = DriveConfig {
        api_base_url: server.uri(),
        ..DriveConfig::default()
    };
    let transport = DriveTransport::new(config).unwrap();

    let err = transport.pull(EntityKind::Job).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)));
}

#[tokio::test]
async fn auth_url_carries_client_id_and_scope() {
    let config = DriveConfig {
        client_id: "my-client".into(),
        ..DriveConfig::default()
    };
    let transport = DriveTransport::new(config).unwrap();
    let url = transport.auth_url();
    assert!(url.contains("client_id=my-client"));
    assert!(url.contains("drive.file"));
}
