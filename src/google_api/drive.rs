//! Drive API v3: find a file by name, download a file by id.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, send_with_retry, GoogleApiError, RetryPolicy, TokenSource};

const DRIVE_FILES: &str = "https://www.googleapis.com/drive/v3/files";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// A downloaded file with its Drive metadata.
#[derive(Debug, Clone)]
pub struct DriveDownload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// The slice of the Drive API resume lookup depends on.
#[async_trait]
pub trait DriveFiles: Send + Sync {
    /// Most recently modified file with exactly this name, if any.
    async fn find_by_name(
        &self,
        filename: &str,
        folder_id: Option<&str>,
    ) -> Result<Option<DriveFile>, GoogleApiError>;

    /// Fetch metadata and content of a file.
    async fn download(&self, file_id: &str) -> Result<DriveDownload, GoogleApiError>;
}

pub struct DriveClient {
    tokens: Arc<TokenSource>,
}

/// Drive query for a non-trashed file by exact name, optionally within a folder.
pub fn name_query(filename: &str, folder_id: Option<&str>) -> String {
    let safe_name = filename.replace('\\', "\\\\").replace('\'', "\\'");
    let mut parts = vec![format!("name = '{}'", safe_name), "trashed = false".to_string()];
    if let Some(folder) = folder_id {
        parts.push(format!("'{}' in parents", folder));
    }
    parts.join(" and ")
}

impl DriveClient {
    pub fn new(tokens: Arc<TokenSource>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl DriveFiles for DriveClient {
    async fn find_by_name(
        &self,
        filename: &str,
        folder_id: Option<&str>,
    ) -> Result<Option<DriveFile>, GoogleApiError> {
        if filename.is_empty() {
            return Ok(None);
        }
        let access_token = self.tokens.access_token().await?;
        let query = name_query(filename, folder_id);
        let resp = send_with_retry(
            self.tokens
                .http()
                .get(DRIVE_FILES)
                .bearer_auth(&access_token)
                .query(&[
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    ("orderBy", "modifiedTime desc"),
                    ("fields", "files(id,name,mimeType,modifiedTime)"),
                    ("pageSize", "10"),
                ]),
            &RetryPolicy::default(),
        )
        .await?;
        let resp = check_status(resp).await?;
        let list: FileListResponse = resp.json().await?;
        Ok(list.files.into_iter().next())
    }

    async fn download(&self, file_id: &str) -> Result<DriveDownload, GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let url = format!("{}/{}", DRIVE_FILES, file_id);

        let meta_resp = send_with_retry(
            self.tokens
                .http()
                .get(&url)
                .bearer_auth(&access_token)
                .query(&[("fields", "id,name,mimeType")]),
            &RetryPolicy::default(),
        )
        .await?;
        let meta: DriveFile = check_status(meta_resp).await?.json().await?;

        let media_resp = send_with_retry(
            self.tokens
                .http()
                .get(&url)
                .bearer_auth(&access_token)
                .query(&[("alt", "media")]),
            &RetryPolicy::default(),
        )
        .await?;
        let bytes = check_status(media_resp).await?.bytes().await?;

        Ok(DriveDownload {
            bytes: bytes.to_vec(),
            filename: meta.name.unwrap_or_else(|| "resume.pdf".to_string()),
            mime_type: meta
                .mime_type
                .unwrap_or_else(|| "application/pdf".to_string()),
        })
    }
}
