pub mod parser;
pub mod store;

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{ReelError, Result};

pub use parser::{parse, render, SAMPLE_SCRIPT};
pub use store::{ScenePatch, SceneStore, StoreEvent};

/// A generated image carried as a `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn from_base64(mime_type: &str, payload: &str) -> Self {
        Self(format!("data:{};base64,{}", mime_type, payload))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or("application/octet-stream")
    }

    /// Decodes the payload back into raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let (_, payload) = self
            .0
            .split_once(";base64,")
            .ok_or_else(|| ReelError::Export("image is not a base64 data URL".to_string()))?;
        Ok(STANDARD.decode(payload)?)
    }
}

/// Where a user-supplied asset lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    File(PathBuf),
    /// Session-only bytes; never written to the project snapshot.
    #[serde(skip)]
    Memory(Vec<u8>),
}

/// A named reference to uploaded audio or video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub name: String,
    pub source: MediaSource,
}

impl MediaRef {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            source: MediaSource::File(path.to_path_buf()),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: MediaSource::Memory(bytes),
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self.source, MediaSource::Memory(_))
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            MediaSource::File(path) => Ok(tokio::fs::read(path).await?),
            MediaSource::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

/// What a scene shows. A video always supersedes a generated image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "asset", rename_all = "snake_case")]
pub enum VisualSource {
    #[default]
    None,
    Image(ImageRef),
    Video(MediaRef),
}

/// One narrated unit of the reel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Merge key, unique within the live collection
    pub scene_number: u32,
    /// Narration text
    pub voiceover: String,
    /// Image prompt; may be empty when a video stands in for it
    pub visual_prompt: String,
    #[serde(default)]
    pub visual: VisualSource,
    /// Uploaded narration; `None` means live speech synthesis
    #[serde(default)]
    pub audio: Option<MediaRef>,
    #[serde(skip)]
    pub is_generating_image: bool,
}

impl Scene {
    pub fn new(scene_number: u32, voiceover: String, visual_prompt: String) -> Self {
        Self {
            scene_number,
            voiceover,
            visual_prompt,
            visual: VisualSource::None,
            audio: None,
            is_generating_image: false,
        }
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match &self.visual {
            VisualSource::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&MediaRef> {
        match &self.visual {
            VisualSource::Video(video) => Some(video),
            _ => None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video().is_some()
    }

    /// Eligible for automatic image generation: has a prompt and no video.
    pub fn is_generation_candidate(&self) -> bool {
        !self.visual_prompt.trim().is_empty() && !self.has_video()
    }
}

/// User input for an interactively added scene. The store assigns the number.
#[derive(Debug, Clone, Default)]
pub struct SceneDraft {
    pub voiceover: String,
    pub visual_prompt: String,
    pub video: Option<MediaRef>,
}

impl SceneDraft {
    pub fn validate(&self) -> Result<()> {
        if self.voiceover.trim().is_empty() {
            return Err(ReelError::InvalidScene(
                "A voiceover is required.".to_string(),
            ));
        }
        if self.visual_prompt.trim().is_empty() && self.video.is_none() {
            return Err(ReelError::InvalidScene(
                "Either a visual prompt or a video file is required.".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds an unnumbered scene; [`SceneStore::append_one`] assigns the number.
    pub(crate) fn into_scene(self) -> Scene {
        let mut scene = Scene::new(
            0,
            self.voiceover.trim().to_string(),
            self.visual_prompt.trim().to_string(),
        );
        if let Some(video) = self.video {
            scene.visual = VisualSource::Video(video);
        }
        scene
    }
}
