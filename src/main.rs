use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use auto_reel::api::drive::APP_FOLDER_NAME;
use auto_reel::config::{self, Settings};
use auto_reel::generation::SceneOutcome;
use auto_reel::playback::ConsoleNarrator;
use auto_reel::scene::{self, MediaRef, Scene, SceneDraft, StoreEvent, VisualSource};
use auto_reel::Studio;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "auto-reel")]
#[command(about = "Turn a scene script into an illustrated reel", long_about = None)]
struct Args {
    /// Project file holding script, title and scenes
    #[arg(short, long, env = "AUTO_REEL_PROJECT", default_value = config::DEFAULT_PROJECT_FILE)]
    project: PathBuf,

    /// Gemini API key used for image generation
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Google Drive OAuth access token used for export
    #[arg(long, env = "GOOGLE_DRIVE_TOKEN", hide_env_values = true)]
    drive_token: Option<String>,

    /// Drive folder that holds one sub-folder per reel
    #[arg(long, env = "AUTO_REEL_DRIVE_FOLDER", default_value = APP_FOLDER_NAME)]
    drive_folder: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the sample script to a file
    Init {
        #[arg(short, long, default_value = "script.md")]
        file: PathBuf,
    },

    /// Parse the script and generate an image for every scene
    Generate {
        /// Input text
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// Input text file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Reel title
        #[arg(long)]
        title: Option<String>,
    },

    /// Generate a new image for one scene
    Regenerate { scene: u32 },

    /// Append a scene; with --video no image is generated
    Add {
        #[arg(long)]
        voiceover: String,

        #[arg(long, default_value = "")]
        prompt: String,

        #[arg(long)]
        video: Option<PathBuf>,
    },

    /// Change a scene's voiceover or visual prompt
    Edit {
        scene: u32,

        #[arg(long)]
        voiceover: Option<String>,

        #[arg(long)]
        prompt: Option<String>,
    },

    /// Attach a narration audio file to a scene
    Audio { scene: u32, file: PathBuf },

    /// Move the scene at position FROM to position TO (1-based)
    Move { from: usize, to: usize },

    /// List the scenes
    Show,

    /// Play a scene's narration
    Play { scene: u32 },

    /// Play the whole reel in order
    Preview {
        /// Narration speed in words per second
        #[arg(long, default_value_t = 2.5)]
        pace: f64,
    },

    /// Upload the reel to Google Drive
    Export {
        #[arg(long)]
        title: Option<String>,
    },

    /// Clear the project and start over
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let pace = match &args.command {
        Command::Preview { pace } => *pace,
        _ => 2.5,
    };
    let settings = Settings::new(args.project, args.gemini_api_key, args.drive_token)
        .with_drive_folder(args.drive_folder);
    let mut studio = Studio::open(settings, Arc::new(ConsoleNarrator::new(pace))).await;

    match args.command {
        Command::Init { file } => {
            tokio::fs::write(&file, scene::SAMPLE_SCRIPT)
                .await
                .context(format!("Failed to write script: {}", file.display()))?;
            studio.set_script(scene::SAMPLE_SCRIPT).await;
            info!("Sample script written to {}", file.display());
        }

        Command::Generate { text, file, title } => {
            if let Some(text) = text {
                studio.set_script(text).await;
            } else if let Some(file_path) = file {
                let text = tokio::fs::read_to_string(&file_path)
                    .await
                    .context(format!("Failed to read file: {}", file_path.display()))?;
                studio.set_script(text).await;
            }
            if let Some(title) = title {
                studio.set_title(title).await;
            }

            info!("Input text length: {} characters", studio.script_text().len());
            let watcher = watch_store(studio.store().subscribe());
            let report = studio.generate().await;
            watcher.abort();

            let report = report?;
            print_scenes(studio.scenes());
            if !report.is_clean() {
                warn!("{}", report.failures);
            }
        }

        Command::Regenerate { scene } => match studio.regenerate(scene).await? {
            SceneOutcome::Generated => info!("Scene {} regenerated", scene),
            SceneOutcome::Failed(message) => warn!(
                "Failed to regenerate image for scene {}. Error: {}",
                scene, message
            ),
            SceneOutcome::Skipped(reason) => {
                warn!("Scene {} not regenerated: {}", scene, reason)
            }
        },

        Command::Add {
            voiceover,
            prompt,
            video,
        } => {
            let video = video
                .map(|path| existing_file(&path, "Video").map(MediaRef::from_path))
                .transpose()?;
            let draft = SceneDraft {
                voiceover,
                visual_prompt: prompt,
                video,
            };
            let added = studio.add_scene(draft).await?;
            match added.outcome {
                SceneOutcome::Failed(message) => warn!(
                    "Failed to generate image for new scene {}. Error: {}",
                    added.scene_number, message
                ),
                _ => info!("Added scene {}", added.scene_number),
            }
        }

        Command::Edit {
            scene,
            voiceover,
            prompt,
        } => {
            studio.edit_scene(scene, voiceover, prompt).await?;
            info!("Scene {} updated", scene);
        }

        Command::Audio { scene, file } => {
            let audio = MediaRef::from_path(existing_file(&file, "Audio")?);
            studio.attach_audio(scene, audio).await?;
            info!("Attached {} to scene {}", file.display(), scene);
        }

        Command::Move { from, to } => {
            studio.move_scene(from, to).await?;
            print_scenes(studio.scenes());
        }

        Command::Show => {
            println!("{}", studio.title());
            print_scenes(studio.scenes());
        }

        Command::Play { scene } => {
            studio.play_narration(scene)?;
            studio.wait_for_playback().await?;
        }

        Command::Preview { .. } => {
            let total = studio.scenes().len();
            let summary = studio
                .preview(|index, scene| {
                    println!("Scene {} ({} of {})", scene.scene_number, index + 1, total)
                })
                .await?;
            if !summary.skipped.is_empty() {
                warn!("Skipped scenes without visuals: {:?}", summary.skipped);
            }
        }

        Command::Export { title } => {
            if let Some(title) = title {
                studio.set_title(title).await;
            }
            studio
                .export(&mut |step: &str| info!("{}", step))
                .await?;
        }

        Command::Reset => {
            studio.reset().await?;
            info!("Project cleared");
        }
    }

    Ok(())
}

fn existing_file<'a>(path: &'a Path, kind: &str) -> anyhow::Result<&'a Path> {
    anyhow::ensure!(path.is_file(), "{} file not found: {}", kind, path.display());
    Ok(path)
}

/// Logs store changes as they happen while a generation runs.
fn watch_store(
    mut events: tokio::sync::broadcast::Receiver<StoreEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::Replaced { count }) => info!("{} scenes queued", count),
                Ok(StoreEvent::Patched(n)) => info!("Scene {} updated", n),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_scenes(scenes: &[Scene]) {
    if scenes.is_empty() {
        println!("(no scenes yet)");
        return;
    }
    for scene in scenes {
        let visual = match &scene.visual {
            VisualSource::Video(video) => format!("video {}", video.name),
            VisualSource::Image(_) => "image ready".to_string(),
            VisualSource::None if scene.is_generating_image => "generating...".to_string(),
            VisualSource::None => "no image".to_string(),
        };
        let audio = scene
            .audio
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("speech");
        println!(
            "[{}] {} | {} | narration: {}",
            scene.scene_number, scene.voiceover, visual, audio
        );
        if !scene.visual_prompt.is_empty() {
            println!("     prompt: {}", scene.visual_prompt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_paths_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"\0").unwrap();

        assert_eq!(existing_file(&clip, "Video").unwrap(), clip.as_path());

        let err = existing_file(&dir.path().join("missing.mp4"), "Video").unwrap_err();
        assert!(err.to_string().starts_with("Video file not found"));
        assert!(existing_file(dir.path(), "Audio").is_err());
    }
}
