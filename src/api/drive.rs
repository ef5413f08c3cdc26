//! Google Drive export.
//!
//! Layout: `<app folder>/<reel title>/scene_<n>_*`. Uploads run one at a time
//! and stop at the first failure; files already sent are left in place.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ReelExporter;
use crate::error::{ReelError, Result};
use crate::scene::{ImageRef, MediaRef, Scene};

const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const APP_FOLDER_NAME: &str = "AI Reel Generator";

#[derive(Debug, Clone)]
pub struct DriveClient {
    access_token: String,
    app_folder: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileId>,
}

#[derive(Debug, Deserialize)]
struct FileId {
    id: String,
}

/// What a single uploaded file is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadContent {
    Text(String),
    Image(ImageRef),
    Media(MediaRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub name: String,
    pub content: UploadContent,
}

impl UploadItem {
    async fn into_part(self) -> Result<Part> {
        let part = match self.content {
            UploadContent::Text(text) => Part::text(text).mime_str("text/plain")?,
            UploadContent::Image(image) => {
                let mime_type = image.mime_type().to_string();
                Part::bytes(image.decode()?).mime_str(&mime_type)?
            }
            UploadContent::Media(media) => Part::bytes(media.read_bytes().await?),
        };
        Ok(part.file_name(self.name))
    }
}

/// Lists every file a reel export will create, in upload order.
pub fn plan_uploads(scenes: &[Scene]) -> Vec<UploadItem> {
    let mut items = Vec::new();
    for scene in scenes {
        let n = scene.scene_number;
        items.push(UploadItem {
            name: format!("scene_{}_voiceover.txt", n),
            content: UploadContent::Text(scene.voiceover.clone()),
        });
        if let Some(image) = scene.image() {
            items.push(UploadItem {
                name: format!("scene_{}_image.jpeg", n),
                content: UploadContent::Image(image.clone()),
            });
        }
        if let Some(video) = scene.video() {
            items.push(UploadItem {
                name: format!("scene_{}_{}", n, video.name),
                content: UploadContent::Media(video.clone()),
            });
        }
        if let Some(audio) = &scene.audio {
            items.push(UploadItem {
                name: format!("scene_{}_{}", n, audio.name),
                content: UploadContent::Media(audio.clone()),
            });
        }
    }
    items
}

impl DriveClient {
    pub fn new(access_token: Option<String>) -> Result<Self> {
        let access_token = access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ReelError::Config(
                    "You are not signed in. Provide a Google Drive access token with --drive-token or GOOGLE_DRIVE_TOKEN."
                        .to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            access_token,
            app_folder: APP_FOLDER_NAME.to_string(),
            client,
        })
    }

    pub fn with_app_folder(mut self, app_folder: impl Into<String>) -> Self {
        self.app_folder = app_folder.into();
        self
    }

    async fn find_or_create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let query = format!(
            "mimeType='{}' and name='{}' and '{}' in parents and trashed=false",
            FOLDER_MIME_TYPE,
            escape_query(name),
            escape_query(parent_id)
        );

        let response = self
            .client
            .get(DRIVE_FILES_API)
            .bearer_auth(&self.access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ReelError::Export(format!(
                "Failed to look up folder '{}': {}",
                name, error_text
            )));
        }

        let existing: FileList = response.json().await?;
        if let Some(folder) = existing.files.into_iter().next() {
            debug!("Found folder '{}' ({})", name, folder.id);
            return Ok(folder.id);
        }

        let response = self
            .client
            .post(DRIVE_FILES_API)
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ReelError::Export(format!(
                "Failed to create folder '{}': {}",
                name, error_text
            )));
        }

        let created: FileId = response.json().await?;
        info!("Created folder '{}' ({})", name, created.id);
        Ok(created.id)
    }

    async fn upload_file(&self, item: UploadItem, parent_id: &str) -> Result<()> {
        let name = item.name.clone();
        let metadata = json!({ "name": &name, "parents": [parent_id] });
        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string()).mime_str("application/json")?,
            )
            .part("file", item.into_part().await?);

        let response = self
            .client
            .post(DRIVE_UPLOAD_API)
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart")])
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("File upload failed for {}: {}", name, error_text);
            return Err(ReelError::Export(format!("Failed to upload {}.", name)));
        }

        debug!("Uploaded {}", name);
        Ok(())
    }

    async fn upload_reel(
        &self,
        title: &str,
        scenes: &[Scene],
        progress: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        progress("Creating folders...");
        let app_folder_id = self.find_or_create_folder(&self.app_folder, "root").await?;
        let reel_folder_id = self.find_or_create_folder(title, &app_folder_id).await?;

        let items = plan_uploads(scenes);
        let total = items.len();
        for (i, item) in items.into_iter().enumerate() {
            progress(&format!("Uploading {} of {}: {}", i + 1, total, item.name));
            self.upload_file(item, &reel_folder_id).await?;
        }

        info!("Uploaded {} files for reel '{}'", total, title);
        Ok(())
    }
}

#[async_trait]
impl ReelExporter for DriveClient {
    async fn upload(
        &self,
        title: &str,
        scenes: &[Scene],
        progress: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        self.upload_reel(title, scenes, progress)
            .await
            .map_err(|e| match e {
                ReelError::Export(_) | ReelError::Config(_) => e,
                other => ReelError::Export(other.to_string()),
            })
    }
}

/// Drive query strings quote values with `'`; backslash and quote must be escaped.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
