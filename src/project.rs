//! Best-effort project snapshot, written after every change and read back on
//! start-up.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::scene::{Scene, VisualSource, SAMPLE_SCRIPT};

pub const DEFAULT_TITLE: &str = "My First AI Reel";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub script_text: String,
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for ProjectSnapshot {
    fn default() -> Self {
        Self {
            script_text: SAMPLE_SCRIPT.to_string(),
            title: DEFAULT_TITLE.to_string(),
            scenes: Vec::new(),
            credentials: Credentials::default(),
        }
    }
}

impl ProjectSnapshot {
    pub fn capture(
        script_text: &str,
        title: &str,
        scenes: &[Scene],
        credentials: Credentials,
    ) -> Self {
        Self {
            script_text: script_text.to_string(),
            title: title.to_string(),
            scenes: scenes.iter().cloned().map(strip_session_state).collect(),
            credentials,
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Project saved to {}", path.display());
        Ok(())
    }

    /// Reads a snapshot back. A missing or unreadable file yields `None`.
    pub async fn load(path: &Path) -> Option<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read project {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<Self>(&raw) {
            Ok(snapshot) => Some(snapshot.restored()),
            Err(e) => {
                warn!("Could not parse project {}: {}", path.display(), e);
                None
            }
        }
    }

    pub async fn remove(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Drops everything that only made sense in the session that saved it.
    fn restored(mut self) -> Self {
        self.scenes = self.scenes.into_iter().map(strip_session_state).collect();
        self
    }
}

fn strip_session_state(mut scene: Scene) -> Scene {
    scene.is_generating_image = false;
    if scene.audio.as_ref().is_some_and(|a| a.is_blob()) {
        scene.audio = None;
    }
    if scene.video().is_some_and(|v| v.is_blob()) {
        scene.visual = VisualSource::None;
    }
    scene
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ImageRef, MediaRef};

    fn sample_scenes() -> Vec<Scene> {
        let mut generating = Scene::new(1, "one".into(), "a cat".into());
        generating.is_generating_image = true;

        let mut with_blobs = Scene::new(2, "two".into(), String::new());
        with_blobs.visual = VisualSource::Video(MediaRef::from_bytes("clip.mp4", vec![1, 2]));
        with_blobs.audio = Some(MediaRef::from_bytes("voice.mp3", vec![3]));

        let mut with_files = Scene::new(3, "three".into(), "a dog".into());
        with_files.visual = VisualSource::Image(ImageRef::from_base64("image/jpeg", "AAAA"));
        with_files.audio = Some(MediaRef::from_path("/media/voice.mp3"));

        vec![generating, with_blobs, with_files]
    }

    #[tokio::test]
    async fn round_trip_clears_session_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        let credentials = Credentials {
            gemini_api_key: Some("key".into()),
            drive_access_token: None,
        };

        ProjectSnapshot::capture("script", "My reel", &sample_scenes(), credentials.clone())
            .save(&path)
            .await
            .unwrap();
        let restored = ProjectSnapshot::load(&path).await.unwrap();

        assert_eq!(restored.script_text, "script");
        assert_eq!(restored.title, "My reel");
        assert_eq!(restored.credentials, credentials);
        assert_eq!(restored.scenes.len(), 3);
        assert!(restored.scenes.iter().all(|s| !s.is_generating_image));

        assert_eq!(restored.scenes[1].visual, VisualSource::None);
        assert!(restored.scenes[1].audio.is_none());

        assert!(restored.scenes[2].image().is_some());
        assert_eq!(
            restored.scenes[2].audio,
            Some(MediaRef::from_path("/media/voice.mp3"))
        );
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        assert!(ProjectSnapshot::load(&path).await.is_none());

        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(ProjectSnapshot::load(&path).await.is_none());
    }

    #[tokio::test]
    async fn remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");
        ProjectSnapshot::remove(&path).await.unwrap();
    }

    #[test]
    fn default_project_starts_from_sample_script() {
        let snapshot = ProjectSnapshot::default();
        assert_eq!(snapshot.title, DEFAULT_TITLE);
        assert_eq!(crate::scene::parse(&snapshot.script_text).len(), 2);
    }
}
