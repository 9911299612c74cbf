//! Dropbox HTTP API client.
//!
//! Implements the small remote-filesystem surface the watcher needs:
//! cursor-based folder listing, download, upload, move and folder
//! creation. The watcher talks to the [`RemoteSession`] trait so tests
//! can substitute an in-memory session.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::store::Credential;

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Access token rejected; exactly one refresh-and-retry is allowed
    #[error("remote authentication failed")]
    Auth,

    /// Path does not exist (a missing inbox means "zero new files")
    #[error("remote path not found")]
    NotFound,

    /// Target already exists (tolerated for scaffold creation)
    #[error("remote path already exists")]
    Conflict,

    #[error("remote API error: {0}")]
    Api(String),

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A file entry from a folder listing
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub path_lower: String,
}

/// One page of a folder listing
#[derive(Debug, Clone)]
pub struct ListPage {
    pub files: Vec<RemoteFile>,
    pub cursor: String,
    pub has_more: bool,
}

/// The account behind an access token
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub email: String,
}

/// Remote filesystem operations, per authenticated account
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// List a folder from the beginning, returning the first page
    async fn list_folder(&self, path: &str) -> Result<ListPage, RemoteError>;

    /// Continue a listing from a saved cursor
    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, RemoteError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Upload file content. With `overwrite` false, an existing target
    /// yields `RemoteError::Conflict`.
    async fn upload(&self, path: &str, bytes: Vec<u8>, overwrite: bool)
        -> Result<(), RemoteError>;

    /// Move a file, auto-renaming on name collision
    async fn move_file(&self, from_path: &str, to_path: &str) -> Result<(), RemoteError>;

    /// Create a folder; an existing folder is not an error
    async fn create_folder(&self, path: &str) -> Result<(), RemoteError>;
}

/// Builds an authenticated session from a stored credential
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// Dropbox API client bound to one access token
pub struct DropboxClient {
    access_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<serde_json::Value>,
    cursor: String,
    has_more: bool,
}

impl DropboxClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Verify the token and fetch the owning account
    pub async fn current_account(&self) -> Result<AccountInfo, RemoteError> {
        self.api_call("users/get_current_account", serde_json::Value::Null)
            .await
    }

    async fn api_call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(format!("{}/{}", API_BASE, endpoint))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Auth);
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();

            if detail.contains("not_found") {
                return Err(RemoteError::NotFound);
            }
            if detail.contains("conflict") {
                return Err(RemoteError::Conflict);
            }

            return Err(RemoteError::Api(format!("{}: {}", status, detail)));
        }

        Ok(response)
    }

    fn into_page(response: ListFolderResponse) -> ListPage {
        // Entries carry a ".tag" discriminator; only file entries matter
        let files = response
            .entries
            .into_iter()
            .filter(|entry| entry.get(".tag").and_then(|t| t.as_str()) == Some("file"))
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();

        ListPage {
            files,
            cursor: response.cursor,
            has_more: response.has_more,
        }
    }
}

#[async_trait]
impl RemoteSession for DropboxClient {
    async fn list_folder(&self, path: &str) -> Result<ListPage, RemoteError> {
        let response: ListFolderResponse = self
            .api_call(
                "files/list_folder",
                serde_json::json!({ "path": path, "recursive": false }),
            )
            .await?;

        Ok(Self::into_page(response))
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, RemoteError> {
        let response: ListFolderResponse = self
            .api_call(
                "files/list_folder/continue",
                serde_json::json!({ "cursor": cursor }),
            )
            .await?;

        Ok(Self::into_page(response))
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let arg = serde_json::json!({ "path": path }).to_string();

        let response = self
            .client
            .post(format!("{}/files/download", CONTENT_BASE))
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", arg)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        let mode = if overwrite { "overwrite" } else { "add" };
        let arg = serde_json::json!({ "path": path, "mode": mode, "autorename": false }).to_string();

        let response = self
            .client
            .post(format!("{}/files/upload", CONTENT_BASE))
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", arg)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn move_file(&self, from_path: &str, to_path: &str) -> Result<(), RemoteError> {
        let _: serde_json::Value = self
            .api_call(
                "files/move_v2",
                serde_json::json!({
                    "from_path": from_path,
                    "to_path": to_path,
                    "autorename": true,
                }),
            )
            .await?;

        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<(), RemoteError> {
        let result: Result<serde_json::Value, RemoteError> = self
            .api_call("files/create_folder_v2", serde_json::json!({ "path": path }))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(RemoteError::Conflict) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Connector producing verified Dropbox sessions
#[derive(Default)]
pub struct DropboxConnector;

impl DropboxConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteConnector for DropboxConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let client = DropboxClient::new(credential.access_token.clone());

        // Probe the token before handing the session out, so an expired
        // token surfaces as Auth here rather than mid-listing
        client.current_account().await?;

        Ok(Box::new(client))
    }
}
