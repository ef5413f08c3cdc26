//! Narration playback and the sequential reel preview.
//!
//! Only one thing plays at a time. [`PlaybackController`] owns that state:
//! starting something new, or dropping the controller, cancels whatever was
//! playing before.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ReelError, Result};
use crate::scene::{MediaRef, Scene, VisualSource};

/// How long a media asset is assumed to run when its length is unknown.
pub const MEDIA_DURATION: Duration = Duration::from_secs(5);

/// A source of narration. Each call resolves on the asset's "ended" signal.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    async fn play_media(&self, media: &MediaRef) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    Speech,
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NowPlaying {
    pub scene_number: u32,
    pub kind: PlaybackKind,
}

/// What the preview plays for a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cue {
    Speech(String),
    Audio(MediaRef),
    /// The clip drives advancement; narration audio plays alongside it.
    Video {
        video: MediaRef,
        narration: Option<MediaRef>,
    },
}

impl Cue {
    fn kind(&self) -> PlaybackKind {
        match self {
            Self::Speech(_) => PlaybackKind::Speech,
            Self::Audio(_) => PlaybackKind::Audio,
            Self::Video { .. } => PlaybackKind::Video,
        }
    }

    /// Cue for the reel preview. Scenes with no visual have nothing to show.
    fn for_preview(scene: &Scene) -> Option<Self> {
        match &scene.visual {
            VisualSource::Video(video) => Some(Self::Video {
                video: video.clone(),
                narration: scene.audio.clone(),
            }),
            VisualSource::Image(_) => Some(Self::for_narration(scene)),
            VisualSource::None => None,
        }
    }

    /// Cue for playing just the voiceover of a scene.
    fn for_narration(scene: &Scene) -> Self {
        match &scene.audio {
            Some(audio) => Self::Audio(audio.clone()),
            None => Self::Speech(scene.voiceover.clone()),
        }
    }

    async fn run(self, narrator: Arc<dyn Narrator>) -> Result<()> {
        match self {
            Self::Speech(text) => narrator.speak(&text).await,
            Self::Audio(audio) => narrator.play_media(&audio).await,
            Self::Video { video, narration } => {
                // dropped with this future, so aborting the cue silences both
                let _side_track = narration.map(|audio| {
                    let narrator = Arc::clone(&narrator);
                    AbortOnDrop(tokio::spawn(async move { narrator.play_media(&audio).await }))
                });
                narrator.play_media(&video).await
            }
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Playing {
    now: NowPlaying,
    task: JoinHandle<Result<()>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewSummary {
    pub played: Vec<u32>,
    /// Scenes with neither image nor video
    pub skipped: Vec<u32>,
}

pub struct PlaybackController {
    narrator: Arc<dyn Narrator>,
    current: Option<Playing>,
}

impl PlaybackController {
    pub fn new(narrator: Arc<dyn Narrator>) -> Self {
        Self {
            narrator,
            current: None,
        }
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.current
            .as_ref()
            .filter(|playing| !playing.task.is_finished())
            .map(|playing| playing.now)
    }

    pub fn is_playing(&self, scene_number: u32) -> bool {
        self.now_playing()
            .is_some_and(|now| now.scene_number == scene_number)
    }

    /// Starts the voiceover of `scene`, cancelling any current playback.
    pub fn play_narration(&mut self, scene: &Scene) -> NowPlaying {
        self.start(scene.scene_number, Cue::for_narration(scene))
    }

    pub fn stop(&mut self) {
        if let Some(playing) = self.current.take() {
            playing.task.abort();
            debug!(scene_number = playing.now.scene_number, "playback stopped");
        }
    }

    /// Stops playback only if it belongs to `scene_number`.
    pub fn stop_scene(&mut self, scene_number: u32) {
        if self.is_playing(scene_number) {
            self.stop();
        }
    }

    /// Waits for the current playback to reach its end.
    ///
    /// The playback stays current until it finishes, so dropping this future
    /// leaves it reachable by [`stop`](Self::stop).
    pub async fn wait(&mut self) -> Result<()> {
        let Some(playing) = self.current.as_mut() else {
            return Ok(());
        };
        let scene_number = playing.now.scene_number;
        let joined = (&mut playing.task).await;
        self.current = None;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ReelError::Playback(format!(
                "scene {} playback crashed: {}",
                scene_number, e
            ))),
        }
    }

    /// Plays every scene in order, advancing on each "ended" signal.
    ///
    /// `on_scene` is called as each scene starts. The preview stops at the
    /// first narration failure.
    pub async fn preview<F>(&mut self, scenes: &[Scene], mut on_scene: F) -> Result<PreviewSummary>
    where
        F: FnMut(usize, &Scene),
    {
        self.stop();
        let mut summary = PreviewSummary::default();

        for (index, scene) in scenes.iter().enumerate() {
            let Some(cue) = Cue::for_preview(scene) else {
                warn!("Scene {} has no image or video, skipping", scene.scene_number);
                summary.skipped.push(scene.scene_number);
                continue;
            };

            on_scene(index, scene);
            self.start(scene.scene_number, cue);
            if let Err(e) = self.wait().await {
                self.stop();
                return Err(e);
            }
            summary.played.push(scene.scene_number);
        }

        info!(
            "Preview finished: {} played, {} skipped",
            summary.played.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    fn start(&mut self, scene_number: u32, cue: Cue) -> NowPlaying {
        self.stop();
        let now = NowPlaying {
            scene_number,
            kind: cue.kind(),
        };
        let narrator = Arc::clone(&self.narrator);
        let task = tokio::spawn(cue.run(narrator));
        debug!(scene_number, kind = ?now.kind, "playback started");
        self.current = Some(Playing { now, task });
        now
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Terminal narrator: prints the cue and waits roughly as long as it would
/// take to hear it.
#[derive(Debug, Clone)]
pub struct ConsoleNarrator {
    words_per_second: f64,
}

impl ConsoleNarrator {
    pub fn new(words_per_second: f64) -> Self {
        Self {
            words_per_second: words_per_second.max(0.1),
        }
    }

    pub fn reading_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        Duration::from_secs_f64(words / self.words_per_second)
    }
}

impl Default for ConsoleNarrator {
    fn default() -> Self {
        Self::new(2.5)
    }
}

#[async_trait]
impl Narrator for ConsoleNarrator {
    async fn speak(&self, text: &str) -> Result<()> {
        println!("  🔊 {}", text);
        std::io::stdout().flush()?;
        tokio::time::sleep(self.reading_time(text)).await;
        Ok(())
    }

    async fn play_media(&self, media: &MediaRef) -> Result<()> {
        println!("  ▶ {}", media.name);
        std::io::stdout().flush()?;
        tokio::time::sleep(MEDIA_DURATION).await;
        Ok(())
    }
}
