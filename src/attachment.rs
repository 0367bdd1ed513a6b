//! Resume attachment lookup.
//!
//! Order: resume map entry for the flag (`name:<file>` searches Drive by name,
//! anything else is a file id), default file name on Drive, default file id on
//! Drive, local resume file. Without Drive only the local file applies.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ResumeConfig;
use crate::google_api::drive::{DriveDownload, DriveFiles};
use crate::google_api::GoogleApiError;
use crate::mailer::Attachment;

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("Drive: {0}")]
    Drive(#[from] GoogleApiError),
    #[error("Local resume: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn resolve(&self, flag: &str) -> Result<Option<Attachment>, AttachmentError>;
}

impl From<DriveDownload> for Attachment {
    fn from(download: DriveDownload) -> Self {
        Attachment {
            bytes: download.bytes,
            filename: download.filename,
            mime_type: download.mime_type,
        }
    }
}

pub struct DriveResumeResolver {
    drive: Option<Arc<dyn DriveFiles>>,
    config: ResumeConfig,
}

impl DriveResumeResolver {
    pub fn new(drive: Option<Arc<dyn DriveFiles>>, config: ResumeConfig) -> Self {
        Self { drive, config }
    }

    /// Name search failures count as "not found".
    async fn download_by_name(
        &self,
        drive: &dyn DriveFiles,
        name: &str,
    ) -> Result<Option<Attachment>, AttachmentError> {
        let found = match drive
            .find_by_name(name, self.config.folder_id.as_deref())
            .await
        {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Drive search for '{}' failed: {}", name, e);
                None
            }
        };
        match found {
            Some(file) => Ok(Some(drive.download(&file.id).await?.into())),
            None => Ok(None),
        }
    }

    fn read_local(&self) -> Result<Option<Attachment>, AttachmentError> {
        let path = &self.config.local_path;
        if !path.is_file() {
            return Ok(None);
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume.pdf".to_string());
        Ok(Some(Attachment {
            bytes: std::fs::read(path)?,
            filename,
            mime_type: "application/pdf".to_string(),
        }))
    }
}

#[async_trait]
impl AttachmentResolver for DriveResumeResolver {
    async fn resolve(&self, flag: &str) -> Result<Option<Attachment>, AttachmentError> {
        let drive = match &self.drive {
            Some(drive) => drive.as_ref(),
            None => return self.read_local(),
        };

        let flag = flag.trim().to_lowercase();
        let mut file_id = self.config.resume_map.get(&flag).cloned();

        if let Some(mapped) = file_id.clone() {
            if mapped.to_lowercase().starts_with("name:") {
                let name = mapped.get(5..).unwrap_or_default().trim();
                if let Some(found) = self.download_by_name(drive, name).await? {
                    return Ok(Some(found));
                }
                file_id = None;
            }
        }

        if let Some(id) = file_id {
            return Ok(Some(drive.download(&id).await?.into()));
        }

        if !self.config.default_name.is_empty() {
            if let Some(found) = self.download_by_name(drive, &self.config.default_name).await? {
                return Ok(Some(found));
            }
        }

        if let Some(id) = &self.config.default_id {
            match drive.download(id).await {
                Ok(download) => return Ok(Some(download.into())),
                Err(e) => log::warn!("Failed to fetch default resume by id '{}': {}", id, e),
            }
        }

        self.read_local()
    }
}
