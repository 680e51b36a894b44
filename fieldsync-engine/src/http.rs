//! Bearer-token HTTP snapshot transport.
//!
//! Talks to a minimal sync endpoint: `POST <base>?action=upload`
//! replaces the latest server copy, `GET <base>?action=latest`
//! returns it. Authentication is a static token in the
//! `X-Auth-Token` header. The body envelope keys each kind's records
//! by its pluralized name and carries timestamp and device id
//! out-of-band, so records travel as the plain flat-array form.

use crate::error::{SyncError, SyncResult};
use crate::snapshot::SyncSnapshot;
use crate::transport::SnapshotTransport;
use async_trait::async_trait;
use fieldsync_types::{DeviceId, EntityKind, UpdatedAt};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Configuration for the HTTP endpoint transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Endpoint base URL (actions are query parameters on it).
    pub base_url: String,
    /// Static bearer credential sent as `X-Auth-Token`.
    pub auth_token: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl HttpConfig {
    /// Creates a config with the default 30 second timeout.
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshot transport over a bearer-token HTTP sync endpoint.
pub struct HttpTransport {
    config: HttpConfig,
    client: Client,
}

impl HttpTransport {
    /// Creates the transport.
    pub fn new(config: HttpConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}?action={}", self.config.base_url, action)
    }
}

#[async_trait]
impl SnapshotTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn push(&self, snapshot: &SyncSnapshot) -> SyncResult<()> {
        let records = serde_json::to_value(&snapshot.records)?;
        let mut body = serde_json::Map::new();
        body.insert(snapshot.entity_kind.plural().to_string(), records);
        body.insert(
            "timestamp".to_string(),
            Value::from(snapshot.timestamp.wall_ms()),
        );
        body.insert(
            "deviceId".to_string(),
            Value::String(snapshot.device_id.to_string()),
        );
        let body = Value::Object(body);

        debug!(
            "uploading {} {} records",
            snapshot.records.len(),
            snapshot.entity_kind
        );

        let response = self
            .client
            .post(self.action_url("upload"))
            .header("X-Auth-Token", &self.config.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SyncError::Auth(format!("upload rejected: {status}")));
        }
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("upload failed: {error}")));
        }

        Ok(())
    }

    async fn pull(&self, kind: EntityKind) -> SyncResult<Option<SyncSnapshot>> {
        let response = self
            .client
            .get(self.action_url("latest"))
            .header("X-Auth-Token", &self.config.auth_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("download failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SyncError::Auth(format!("download rejected: {status}")));
        }
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("download failed: {error}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedRemoteData(format!("latest response: {e}")))?;

        // `{ "error": ... }` means the server has nothing stored yet.
        if body.get("error").is_some() {
            return Ok(None);
        }

        let Some(data) = body.get("data") else {
            return Err(SyncError::MalformedRemoteData(
                "latest response has neither data nor error".to_string(),
            ));
        };

        let Some(records) = data.get(kind.plural()) else {
            return Ok(None);
        };

        let mut snapshot = SyncSnapshot::from_wire(kind, records)?;

        // Envelope metadata wins over anything carried in-band.
        if let Some(ms) = data.get("timestamp").and_then(Value::as_u64) {
            snapshot.timestamp = UpdatedAt::new(ms, 0);
        }
        if let Some(id) = data
            .get("deviceId")
            .and_then(Value::as_str)
            .and_then(|s| DeviceId::parse(s).ok())
        {
            snapshot.device_id = id;
        }

        Ok(Some(snapshot))
    }
}
