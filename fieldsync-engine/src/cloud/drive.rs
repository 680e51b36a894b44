//! Google Drive snapshot transport.
//!
//! Uses Drive API v3. The remote layout is one folder (found or
//! created on first use) holding one `{kind}.json` file per entity
//! kind; a push overwrites the file in place so the remote always
//! holds exactly the latest snapshot.

use crate::error::{SyncError, SyncResult};
use crate::snapshot::SyncSnapshot;
use crate::transport::SnapshotTransport;
use async_trait::async_trait;
use fieldsync_types::EntityKind;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Google Drive transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Redirect URI for the OAuth flow.
    pub redirect_uri: String,
    /// Folder name holding the snapshot files.
    pub sync_folder: String,
    /// Base URL for the Drive API (e.g. `https://www.googleapis.com`).
    pub api_base_url: String,
    /// Base URL for the OAuth2 token endpoint.
    pub oauth_base_url: String,
    /// Base URL for the interactive auth page.
    pub auth_base_url: String,
    /// Per-request timeout.
    #[serde(skip, default = "default_timeout")]
    pub request_timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "urn:ietf:wg:oauth:2.0:oob".to_string(),
            sync_folder: "FieldSync".to_string(),
            api_base_url: "https://www.googleapis.com".to_string(),
            oauth_base_url: "https://oauth2.googleapis.com".to_string(),
            auth_base_url: "https://accounts.google.com".to_string(),
            request_timeout: default_timeout(),
        }
    }
}

/// OAuth2 tokens.
#[derive(Debug, Clone)]
struct OAuthTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<SystemTime>,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Snapshot transport backed by a Google Drive app folder.
pub struct DriveTransport {
    config: DriveConfig,
    client: Client,
    tokens: Arc<RwLock<Option<OAuthTokens>>>,
    sync_folder_id: Arc<RwLock<Option<String>>>,
}

impl DriveTransport {
    /// Creates a new, unauthenticated Drive transport.
    pub fn new(config: DriveConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            tokens: Arc::new(RwLock::new(None)),
            sync_folder_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Seeds tokens loaded from local storage.
    pub async fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        *self.tokens.write().await = Some(OAuthTokens {
            access_token,
            refresh_token,
            expires_at: None,
        });
    }

    /// Whether the transport currently holds tokens.
    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// The interactive OAuth2 URL to open in a browser.
    #[must_use]
    pub fn auth_url(&self) -> String {
        let scope = "https://www.googleapis.com/auth/drive.file";
        format!(
            "{}/o/oauth2/v2/auth?\
            client_id={}&\
            redirect_uri={}&\
            response_type=code&\
            scope={}&\
            access_type=offline&\
            prompt=consent",
            self.config.auth_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(scope)
        )
    }

    /// Exchanges the auth code from the browser flow for tokens.
    pub async fn complete_auth(&self, auth_code: &str) -> SyncResult<()> {
        debug!("Exchanging auth code for tokens");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("code", &auth_code.to_string()),
                ("redirect_uri", &self.config.redirect_uri),
                ("grant_type", &"authorization_code".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("token exchange failed: {error}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse token response: {e}")))?;

        *self.tokens.write().await = Some(OAuthTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at: expiry_from(token_response.expires_in),
        });
        info!("Google Drive authentication successful");

        Ok(())
    }

    /// Gets the current access token, refreshing if needed.
    async fn get_access_token(&self) -> SyncResult<String> {
        let (access_token, expired) = {
            let guard = self.tokens.read().await;
            let tokens = guard
                .as_ref()
                .ok_or_else(|| SyncError::Auth("not authenticated".to_string()))?;

            let expired = tokens
                .expires_at
                .is_some_and(|exp| SystemTime::now() > exp);

            (tokens.access_token.clone(), expired)
        }; // read lock dropped here

        if expired {
            return self.refresh_token().await;
        }

        Ok(access_token)
    }

    async fn refresh_token(&self) -> SyncResult<String> {
        let tokens = self.tokens.read().await;
        let refresh_token = tokens
            .as_ref()
            .and_then(|t| t.refresh_token.as_ref())
            .ok_or_else(|| SyncError::Auth("no refresh token available".to_string()))?
            .clone();
        drop(tokens);

        debug!("Refreshing Google Drive access token");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("refresh_token", &refresh_token),
                ("grant_type", &"refresh_token".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("token refresh failed: {error}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse token response: {e}")))?;

        let new_tokens = OAuthTokens {
            access_token: token_response.access_token.clone(),
            refresh_token: token_response.refresh_token.or(Some(refresh_token)),
            expires_at: expiry_from(token_response.expires_in),
        };

        *self.tokens.write().await = Some(new_tokens);

        Ok(token_response.access_token)
    }

    /// Finds or creates the sync folder, caching the id.
    async fn get_or_create_sync_folder(&self) -> SyncResult<String> {
        if let Some(folder_id) = self.sync_folder_id.read().await.as_ref() {
            return Ok(folder_id.clone());
        }

        let access_token = self.get_access_token().await?;

        let query = format!(
            "name = '{}' and mimeType = 'application/vnd.google-apps.folder' and 'root' in parents and trashed = false",
            self.config.sync_folder
        );

        let response = self
            .client
            .get(format!("{}/drive/v3/files", self.config.api_base_url))
            .bearer_auth(&access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("folder search failed: {e}")))?;

        if !response.status().is_success() {
            return Err(api_error("folder search", response).await);
        }

        let file_list: DriveFileList = response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("failed to parse folder list: {e}")))?;

        let folder_id = if let Some(folder) = file_list.files.first() {
            folder.id.clone()
        } else {
            let metadata = serde_json::json!({
                "name": self.config.sync_folder,
                "mimeType": "application/vnd.google-apps.folder",
                "parents": ["root"]
            });

            let response = self
                .client
                .post(format!("{}/drive/v3/files", self.config.api_base_url))
                .bearer_auth(&access_token)
                .json(&metadata)
                .send()
                .await
                .map_err(|e| SyncError::Network(format!("folder creation failed: {e}")))?;

            if !response.status().is_success() {
                return Err(api_error("folder creation", response).await);
            }

            let created: DriveFile = response
                .json()
                .await
                .map_err(|e| SyncError::Network(format!("failed to parse created folder: {e}")))?;

            info!("Created sync folder: {}", self.config.sync_folder);
            created.id
        };

        *self.sync_folder_id.write().await = Some(folder_id.clone());
        Ok(folder_id)
    }

    /// Finds the snapshot file for a kind, if it exists.
    async fn find_snapshot_file(&self, kind: EntityKind) -> SyncResult<Option<String>> {
        let access_token = self.get_access_token().await?;
        let folder_id = self.get_or_create_sync_folder().await?;

        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            snapshot_file_name(kind),
            folder_id
        );

        let response = self
            .client
            .get(format!("{}/drive/v3/files", self.config.api_base_url))
            .bearer_auth(&access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("file search failed: {e}")))?;

        if !response.status().is_success() {
            return Err(api_error("file search", response).await);
        }

        let file_list: DriveFileList = response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("failed to parse file list: {e}")))?;

        Ok(file_list.files.first().map(|f| f.id.clone()))
    }

    /// Creates the snapshot file for a kind via multipart upload.
    async fn create_file(&self, kind: EntityKind, content: &[u8]) -> SyncResult<()> {
        let access_token = self.get_access_token().await?;
        let folder_id = self.get_or_create_sync_folder().await?;
        let name = snapshot_file_name(kind);

        debug!("Creating snapshot file: {} ({} bytes)", name, content.len());

        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id]
        });

        let boundary = "fieldsync_boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: application/json\r\n\r\n"
        ).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--").as_bytes());

        let response = self
            .client
            .post(format!(
                "{}/upload/drive/v3/files?uploadType=multipart",
                self.config.api_base_url
            ))
            .bearer_auth(&access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(api_error("snapshot upload", response).await);
        }

        info!("Uploaded snapshot file: {}", name);
        Ok(())
    }

    /// Overwrites an existing snapshot file in place.
    async fn overwrite_file(&self, file_id: &str, content: &[u8]) -> SyncResult<()> {
        let access_token = self.get_access_token().await?;

        debug!("Overwriting snapshot file: {}", file_id);

        let response = self
            .client
            .patch(format!(
                "{}/upload/drive/v3/files/{}?uploadType=media",
                self.config.api_base_url, file_id
            ))
            .bearer_auth(&access_token)
            .header("Content-Type", "application/json")
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(api_error("snapshot upload", response).await);
        }

        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> SyncResult<Vec<u8>> {
        let access_token = self.get_access_token().await?;

        debug!("Downloading snapshot file: {}", file_id);

        let response = self
            .client
            .get(format!(
                "{}/drive/v3/files/{}?alt=media",
                self.config.api_base_url, file_id
            ))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(api_error("snapshot download", response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("read download body failed: {e}")))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SnapshotTransport for DriveTransport {
    fn name(&self) -> &str {
        "drive"
    }

    async fn push(&self, snapshot: &SyncSnapshot) -> SyncResult<()> {
        let wire = snapshot.to_wire()?;
        let content = serde_json::to_vec(&wire)?;

        match self.find_snapshot_file(snapshot.entity_kind).await? {
            Some(file_id) => self.overwrite_file(&file_id, &content).await,
            None => self.create_file(snapshot.entity_kind, &content).await,
        }
    }

    async fn pull(&self, kind: EntityKind) -> SyncResult<Option<SyncSnapshot>> {
        let Some(file_id) = self.find_snapshot_file(kind).await? else {
            return Ok(None);
        };

        let bytes = self.download_file(&file_id).await?;
        let wire: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::MalformedRemoteData(format!("{kind} snapshot file: {e}")))?;

        Ok(Some(SyncSnapshot::from_wire(kind, &wire)?))
    }
}

fn snapshot_file_name(kind: EntityKind) -> String {
    format!("{}.json", kind.plural())
}

/// Maps a non-success Drive response to the right error class: 401
/// and 403 mean the token was rejected, everything else is a network
/// or server fault.
async fn api_error(context: &str, response: reqwest::Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        SyncError::Auth(format!("{context} rejected: {status}"))
    } else {
        SyncError::Network(format!("{context} failed ({status}): {body}"))
    }
}

fn expiry_from(expires_in: Option<u64>) -> Option<SystemTime> {
    // 60s buffer so a token is refreshed before it actually lapses.
    expires_in.map(|secs| SystemTime::now() + Duration::from_secs(secs.saturating_sub(60)))
}
