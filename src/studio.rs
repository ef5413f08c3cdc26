//! The working session behind the command line: current script, title and
//! scenes, plus the busy gate and playback state. Every change is written
//! back to the project file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api::{DriveClient, GeminiClient, ImageGenerator, ReelExporter};
use crate::config::Settings;
use crate::error::{ReelError, Result};
use crate::generation::{
    Activity, AddedScene, BatchReport, BusyGate, Checkpoint, Orchestrator, SceneOutcome,
};
use crate::playback::{Narrator, NowPlaying, PlaybackController, PreviewSummary};
use crate::project::{Credentials, ProjectSnapshot};
use crate::scene::{ImageRef, MediaRef, Scene, SceneDraft, ScenePatch, SceneStore};

pub struct Studio {
    settings: Settings,
    script_text: String,
    title: String,
    store: SceneStore,
    gate: BusyGate,
    playback: PlaybackController,
    generator: Option<Arc<dyn ImageGenerator>>,
    exporter: Option<Arc<dyn ReelExporter>>,
}

impl Studio {
    /// Opens the project at `settings.project_path`, or a fresh one.
    pub async fn open(settings: Settings, narrator: Arc<dyn Narrator>) -> Self {
        let snapshot = ProjectSnapshot::load(&settings.project_path)
            .await
            .unwrap_or_default();
        let settings = settings.with_saved_credentials(&snapshot.credentials);
        info!(
            "Opened project {} ({} scenes)",
            settings.project_path.display(),
            snapshot.scenes.len()
        );

        Self {
            settings,
            script_text: snapshot.script_text,
            title: snapshot.title,
            store: SceneStore::with_scenes(snapshot.scenes),
            gate: BusyGate::new(),
            playback: PlaybackController::new(narrator),
            generator: None,
            exporter: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ReelExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    pub fn scenes(&self) -> &[Scene] {
        self.store.scenes()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn script_text(&self) -> &str {
        &self.script_text
    }

    pub fn gate(&self) -> &BusyGate {
        &self.gate
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.playback.now_playing()
    }

    pub async fn set_script(&mut self, text: impl Into<String>) {
        self.script_text = text.into();
        self.persist().await;
    }

    pub async fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.persist().await;
    }

    /// Parses the current script and regenerates every scene from scratch.
    pub async fn generate(&mut self) -> Result<BatchReport> {
        let orchestrator = self.orchestrator()?;
        self.playback.stop();

        let result = orchestrator
            .generate_from_script(&mut self.store, &self.script_text)
            .await;
        self.persist().await;
        result
    }

    pub async fn regenerate(&mut self, scene_number: u32) -> Result<SceneOutcome> {
        let orchestrator = self.orchestrator()?;
        let eligible = !self.gate.is_busy()
            && self
                .store
                .get(scene_number)
                .is_some_and(|s| s.is_generation_candidate());
        if eligible {
            self.playback.stop_scene(scene_number);
        }

        let outcome = orchestrator.regenerate(&mut self.store, scene_number).await;
        if !matches!(outcome, SceneOutcome::Skipped(_)) {
            self.persist().await;
        }
        Ok(outcome)
    }

    pub async fn add_scene(&mut self, draft: SceneDraft) -> Result<AddedScene> {
        let added = if draft.video.is_some() {
            // no provider call, so no key needed
            self.orchestrator_with(Arc::new(NoGenerator))
                .add_scene(&mut self.store, draft)
                .await?
        } else {
            self.orchestrator()?.add_scene(&mut self.store, draft).await?
        };
        self.persist().await;
        Ok(added)
    }

    /// Replaces the given text fields. The voiceover can't be blanked, and
    /// neither can the prompt unless a video stands in for it.
    pub async fn edit_scene(
        &mut self,
        scene_number: u32,
        voiceover: Option<String>,
        visual_prompt: Option<String>,
    ) -> Result<()> {
        let voiceover = voiceover.map(|v| v.trim().to_string());
        let visual_prompt = visual_prompt.map(|p| p.trim().to_string());

        let scene = self
            .store
            .get(scene_number)
            .ok_or_else(|| ReelError::InvalidScene(format!("no scene {}", scene_number)))?;
        if voiceover.as_deref() == Some("") {
            return Err(ReelError::InvalidScene(
                "A voiceover is required.".to_string(),
            ));
        }
        if visual_prompt.as_deref() == Some("") && !scene.has_video() {
            return Err(ReelError::InvalidScene(
                "Either a visual prompt or a video file is required.".to_string(),
            ));
        }

        let patch = ScenePatch {
            voiceover,
            visual_prompt,
            ..Default::default()
        };
        self.patch_existing(scene_number, &patch)?;
        self.persist().await;
        Ok(())
    }

    pub async fn attach_audio(&mut self, scene_number: u32, audio: MediaRef) -> Result<()> {
        self.patch_existing(scene_number, &ScenePatch::audio(audio))?;
        self.playback.stop_scene(scene_number);
        self.persist().await;
        Ok(())
    }

    /// Moves the scene at 1-based `from` to 1-based `to`.
    pub async fn move_scene(&mut self, from: usize, to: usize) -> Result<()> {
        if from == 0 || to == 0 {
            return Err(ReelError::InvalidScene(
                "positions start at 1".to_string(),
            ));
        }
        self.store.move_scene(from - 1, to - 1)?;
        self.persist().await;
        Ok(())
    }

    pub fn play_narration(&mut self, scene_number: u32) -> Result<NowPlaying> {
        let scene = self
            .store
            .get(scene_number)
            .ok_or_else(|| ReelError::InvalidScene(format!("no scene {}", scene_number)))?;
        Ok(self.playback.play_narration(scene))
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
    }

    pub async fn wait_for_playback(&mut self) -> Result<()> {
        self.playback.wait().await
    }

    pub async fn preview<F>(&mut self, on_scene: F) -> Result<PreviewSummary>
    where
        F: FnMut(usize, &Scene),
    {
        let scenes = self.store.scenes().to_vec();
        self.playback.preview(&scenes, on_scene).await
    }

    /// Uploads the reel. Fails before any upload when the title or reel is
    /// empty, or when something else holds the busy gate.
    pub async fn export(
        &mut self,
        progress: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ReelError::Export(
                "Give your reel a title before exporting.".to_string(),
            ));
        }
        if self.store.is_empty() {
            return Err(ReelError::Export(
                "No scenes to save. Generate some first.".to_string(),
            ));
        }

        let exporter = self.exporter()?;
        let _guard = self
            .gate
            .try_acquire(Activity::Export)
            .map_err(ReelError::Busy)?;

        progress("Connecting...");
        exporter.upload(&title, self.store.scenes(), progress).await?;
        progress("All saved! Go check your Drive.");
        info!("Exported reel '{}' ({} scenes)", title, self.store.len());
        Ok(())
    }

    /// Starts over: empty reel, sample script, saved project removed.
    pub async fn reset(&mut self) -> Result<()> {
        if let Some(active) = self.gate.current() {
            return Err(ReelError::Busy(active));
        }

        self.playback.stop();
        ProjectSnapshot::remove(&self.settings.project_path).await?;
        let fresh = ProjectSnapshot::default();
        self.script_text = fresh.script_text;
        self.title = fresh.title;
        self.store.clear();
        info!("Project reset");
        Ok(())
    }

    fn patch_existing(&mut self, scene_number: u32, patch: &ScenePatch) -> Result<()> {
        if self.store.patch_by_key(scene_number, patch) {
            Ok(())
        } else {
            Err(ReelError::InvalidScene(format!("no scene {}", scene_number)))
        }
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let generator = match &self.generator {
            Some(generator) => Arc::clone(generator),
            None => Arc::new(GeminiClient::new(self.settings.require_gemini_key()?)?),
        };
        Ok(self.orchestrator_with(generator))
    }

    fn orchestrator_with(&self, generator: Arc<dyn ImageGenerator>) -> Orchestrator {
        Orchestrator::new(generator, self.gate.clone())
            .with_checkpoint(Arc::new(self.checkpoint()))
    }

    fn exporter(&self) -> Result<Arc<dyn ReelExporter>> {
        match &self.exporter {
            Some(exporter) => Ok(Arc::clone(exporter)),
            None => Ok(Arc::new(
                DriveClient::new(self.settings.drive_access_token.clone())?
                    .with_app_folder(self.settings.drive_folder.clone()),
            )),
        }
    }

    fn checkpoint(&self) -> ProjectCheckpoint {
        ProjectCheckpoint {
            path: self.settings.project_path.clone(),
            script_text: self.script_text.clone(),
            title: self.title.clone(),
            credentials: self.settings.credentials(),
        }
    }

    async fn persist(&self) {
        self.checkpoint().save(self.store.scenes()).await;
    }
}

/// Everything but the scenes, captured when a save is scheduled.
struct ProjectCheckpoint {
    path: PathBuf,
    script_text: String,
    title: String,
    credentials: Credentials,
}

#[async_trait]
impl Checkpoint for ProjectCheckpoint {
    async fn save(&self, scenes: &[Scene]) {
        let snapshot = ProjectSnapshot::capture(
            &self.script_text,
            &self.title,
            scenes,
            self.credentials.clone(),
        );
        if let Err(e) = snapshot.save(&self.path).await {
            warn!("Could not save project: {}", e);
        }
    }
}

/// Used for video scenes, which never reach the provider.
struct NoGenerator;

#[async_trait]
impl ImageGenerator for NoGenerator {
    async fn generate_image(&self, _prompt: &str) -> Result<ImageRef> {
        Err(ReelError::Config("no image provider configured".to_string()))
    }
}
