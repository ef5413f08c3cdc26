pub mod drive;
pub mod gemini;

use async_trait::async_trait;

use crate::error::Result;
use crate::scene::{ImageRef, Scene};

pub use drive::DriveClient;
pub use gemini::GeminiClient;

/// The external image-generation provider.
///
/// Failures come back as [`crate::error::ReelError::Provider`] carrying a
/// message meant to be shown to the user as-is.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<ImageRef>;
}

/// Uploads a finished reel somewhere remote, reporting each step.
#[async_trait]
pub trait ReelExporter: Send + Sync {
    async fn upload(
        &self,
        title: &str,
        scenes: &[Scene],
        progress: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()>;
}
