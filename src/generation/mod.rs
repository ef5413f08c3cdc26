//! Image generation across the scenes of a reel.
//!
//! Each request runs as its own task and reports back over a channel. The
//! orchestrator is the only writer to the [`SceneStore`]: it applies every
//! completion the moment it arrives, so observers see partial progress, and
//! declares a run finished only once every task has settled.

mod gate;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::ImageGenerator;
use crate::error::{ReelError, Result};
use crate::scene::{self, ImageRef, Scene, SceneDraft, ScenePatch, SceneStore};

pub use gate::{Activity, BusyGate, BusyGuard};

/// One scene's image request.
#[derive(Debug, Clone)]
struct Job {
    scene_number: u32,
    prompt: String,
}

/// The single patch a task sends back.
#[derive(Debug)]
struct Completion {
    scene_number: u32,
    result: Result<ImageRef>,
}

/// Per-scene failures of a run, kept in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSummary {
    failures: Vec<(u32, String)>,
}

impl FailureSummary {
    pub fn record(&mut self, scene_number: u32, message: impl Into<String>) {
        self.failures.push((scene_number, message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn scene_numbers(&self) -> Vec<u32> {
        self.failures.iter().map(|(n, _)| *n).collect()
    }

    pub fn message_for(&self, scene_number: u32) -> Option<&str> {
        self.failures
            .iter()
            .find(|(n, _)| *n == scene_number)
            .map(|(_, msg)| msg.as_str())
    }
}

impl fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (scene_number, message)) in self.failures.iter().enumerate() {
            if i == 0 {
                write!(
                    f,
                    "Image generation failed for scene {}. Error: {}",
                    scene_number, message
                )?;
            } else {
                write!(f, "; scene {}. Error: {}", scene_number, message)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Scene numbers that received an image, in completion order
    pub succeeded: Vec<u32>,
    pub failures: FailureSummary,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn outcome_for(&self, scene_number: u32) -> SceneOutcome {
        match self.failures.message_for(scene_number) {
            Some(message) => SceneOutcome::Failed(message.to_string()),
            None => SceneOutcome::Generated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Busy(Activity),
    MissingScene,
    HasVideo,
    NoPrompt,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy(activity) => write!(f, "{} is already running", activity),
            Self::MissingScene => write!(f, "no such scene"),
            Self::HasVideo => write!(f, "scene uses a video clip"),
            Self::NoPrompt => write!(f, "scene has no visual prompt"),
        }
    }
}

/// Result of a single-scene generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneOutcome {
    Generated,
    Failed(String),
    /// Nothing was requested and the store was not touched.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedScene {
    pub scene_number: u32,
    pub outcome: SceneOutcome,
}

/// Saves the scene collection while a run is in flight. Best effort: a
/// failed save is the implementor's to log.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    async fn save(&self, scenes: &[Scene]);
}

pub struct Orchestrator {
    generator: Arc<dyn ImageGenerator>,
    gate: BusyGate,
    checkpoint: Option<Arc<dyn Checkpoint>>,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn ImageGenerator>, gate: BusyGate) -> Self {
        Self {
            generator,
            gate,
            checkpoint: None,
        }
    }

    /// Saves through `checkpoint` when a run starts and after every completion.
    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn Checkpoint>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn gate(&self) -> &BusyGate {
        &self.gate
    }

    /// Parses `text` and runs a batch over the result.
    ///
    /// Nothing is requested and the store is left alone when the script has
    /// no usable scenes.
    pub async fn generate_from_script(
        &self,
        store: &mut SceneStore,
        text: &str,
    ) -> Result<BatchReport> {
        if let Some(active) = self.gate.current() {
            return Err(ReelError::Busy(active));
        }

        let scenes = scene::parse(text);
        if scenes.is_empty() {
            return Err(ReelError::ParseEmpty);
        }
        info!("Parsed {} scenes from script", scenes.len());
        self.run_batch(store, scenes).await
    }

    /// Replaces the store with `scenes` and generates an image for every
    /// eligible one concurrently. Failures are isolated per scene.
    pub async fn run_batch(
        &self,
        store: &mut SceneStore,
        scenes: Vec<Scene>,
    ) -> Result<BatchReport> {
        let _guard = self
            .gate
            .try_acquire(Activity::BatchGeneration)
            .map_err(ReelError::Busy)?;

        let scenes: Vec<Scene> = scenes
            .into_iter()
            .map(|mut scene| {
                scene.is_generating_image = scene.is_generation_candidate();
                scene
            })
            .collect();

        let jobs: Vec<Job> = scenes
            .iter()
            .filter(|s| s.is_generating_image)
            .map(|s| Job {
                scene_number: s.scene_number,
                prompt: s.visual_prompt.clone(),
            })
            .collect();

        store.replace_all(scenes);
        info!("Generating images for {} scenes...", jobs.len());

        let report = self.settle_all(store, jobs).await;
        if report.is_clean() {
            info!("Batch finished: {} images generated", report.succeeded.len());
        } else {
            warn!(
                "Batch finished with {} failures: {}",
                report.failures.len(),
                report.failures
            );
        }
        Ok(report)
    }

    /// Generates a fresh image for one existing scene.
    ///
    /// Refused without side effects while anything else holds the busy gate,
    /// or when the scene is missing, carries a video, or has no prompt.
    pub async fn regenerate(&self, store: &mut SceneStore, scene_number: u32) -> SceneOutcome {
        let _guard = match self.gate.try_acquire(Activity::SingleGeneration) {
            Ok(guard) => guard,
            Err(active) => return SceneOutcome::Skipped(SkipReason::Busy(active)),
        };

        let Some(scene) = store.get(scene_number) else {
            return SceneOutcome::Skipped(SkipReason::MissingScene);
        };
        if scene.has_video() {
            return SceneOutcome::Skipped(SkipReason::HasVideo);
        }
        if scene.visual_prompt.trim().is_empty() {
            return SceneOutcome::Skipped(SkipReason::NoPrompt);
        }

        let job = Job {
            scene_number,
            prompt: scene.visual_prompt.clone(),
        };
        store.patch_by_key(scene_number, &ScenePatch::generation_started());

        let report = self.settle_all(store, vec![job]).await;
        report.outcome_for(scene_number)
    }

    /// Appends a user-authored scene. A scene with a video is appended as-is;
    /// otherwise an image is generated for it under the busy gate.
    pub async fn add_scene(&self, store: &mut SceneStore, draft: SceneDraft) -> Result<AddedScene> {
        draft.validate()?;
        if let Some(active) = self.gate.current() {
            return Err(ReelError::Busy(active));
        }

        if draft.video.is_some() {
            let scene_number = store.append_one(draft.into_scene())?;
            info!("Added video scene {}", scene_number);
            return Ok(AddedScene {
                scene_number,
                outcome: SceneOutcome::Skipped(SkipReason::HasVideo),
            });
        }

        let _guard = self
            .gate
            .try_acquire(Activity::SingleGeneration)
            .map_err(ReelError::Busy)?;

        let mut scene = draft.into_scene();
        scene.is_generating_image = true;
        let prompt = scene.visual_prompt.clone();
        let scene_number = store.append_one(scene)?;
        info!("Added scene {}, generating image", scene_number);

        let report = self
            .settle_all(
                store,
                vec![Job {
                    scene_number,
                    prompt,
                }],
            )
            .await;
        Ok(AddedScene {
            scene_number,
            outcome: report.outcome_for(scene_number),
        })
    }

    /// Spawns one task per job and applies completions as they arrive.
    /// Returns once every task has reported or gone away.
    async fn settle_all(&self, store: &mut SceneStore, jobs: Vec<Job>) -> BatchReport {
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let mut outstanding: HashMap<u32, usize> = HashMap::new();

        for job in jobs {
            *outstanding.entry(job.scene_number).or_default() += 1;
            let tx = tx.clone();
            let generator = Arc::clone(&self.generator);
            tokio::spawn(async move {
                let result = generator.generate_image(&job.prompt).await;
                let _ = tx.send(Completion {
                    scene_number: job.scene_number,
                    result,
                });
            });
        }
        drop(tx);
        self.save_checkpoint(store).await;

        let mut report = BatchReport::default();
        while let Some(completion) = rx.recv().await {
            if let Some(count) = outstanding.get_mut(&completion.scene_number) {
                *count -= 1;
                if *count == 0 {
                    outstanding.remove(&completion.scene_number);
                }
            }
            apply_completion(store, completion, &mut report);
            self.save_checkpoint(store).await;
        }

        // a task that panicked drops its sender without reporting
        let mut lost: Vec<u32> = outstanding.into_keys().collect();
        lost.sort_unstable();
        let any_lost = !lost.is_empty();
        for scene_number in lost {
            error!("Generation task for scene {} ended without a result", scene_number);
            apply_completion(
                store,
                Completion {
                    scene_number,
                    result: Err(ReelError::Provider(
                        "generation task ended without a result".to_string(),
                    )),
                },
                &mut report,
            );
        }

        if any_lost {
            self.save_checkpoint(store).await;
        }
        report
    }

    async fn save_checkpoint(&self, store: &SceneStore) {
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.save(store.scenes()).await;
        }
    }
}

fn apply_completion(store: &mut SceneStore, completion: Completion, report: &mut BatchReport) {
    let Completion {
        scene_number,
        result,
    } = completion;

    match result {
        Ok(image) => {
            info!("Generated image for scene {}", scene_number);
            store.patch_by_key(scene_number, &ScenePatch::generation_succeeded(image));
            report.succeeded.push(scene_number);
        }
        Err(e) => {
            error!("Failed to generate image for scene {}: {}", scene_number, e);
            store.patch_by_key(scene_number, &ScenePatch::generation_failed());
            report.failures.record(scene_number, e.to_string());
        }
    }
}
