//! auto-reel: script in, illustrated reel out.
//!
//! A script in the `**SCENE n**` / `**Voiceover:**` / `**Visual Prompt:**`
//! format is split into scenes, an image is generated for each one
//! concurrently, and the result can be edited, reordered, previewed and
//! uploaded to Google Drive.
//!
//! ```no_run
//! use std::sync::Arc;
//! use auto_reel::{config::Settings, playback::ConsoleNarrator, Studio};
//!
//! # async fn demo() -> auto_reel::Result<()> {
//! let settings = Settings::new("reel.json".into(), Some("gemini-key".into()), None);
//! let mut studio = Studio::open(settings, Arc::new(ConsoleNarrator::default())).await;
//! let report = studio.generate().await?;
//! println!("{} images, failures: {}", report.succeeded.len(), report.failures);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod playback;
pub mod project;
pub mod scene;
pub mod studio;

pub use error::{ReelError, Result};
pub use studio::Studio;
