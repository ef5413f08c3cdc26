use std::path::PathBuf;

use crate::api::drive::APP_FOLDER_NAME;
use crate::error::{ReelError, Result};
use crate::project::Credentials;

pub const DEFAULT_PROJECT_FILE: &str = "auto-reel.json";

/// Resolved runtime settings.
///
/// Precedence per value: command line, then environment (both handled by
/// clap), then whatever the saved project remembered.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_path: PathBuf,
    pub gemini_api_key: Option<String>,
    pub drive_access_token: Option<String>,
    pub drive_folder: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from(DEFAULT_PROJECT_FILE),
            gemini_api_key: None,
            drive_access_token: None,
            drive_folder: APP_FOLDER_NAME.to_string(),
        }
    }
}

impl Settings {
    pub fn new(
        project_path: PathBuf,
        gemini_api_key: Option<String>,
        drive_access_token: Option<String>,
    ) -> Self {
        Self {
            project_path,
            gemini_api_key: non_blank(gemini_api_key),
            drive_access_token: non_blank(drive_access_token),
            ..Default::default()
        }
    }

    pub fn with_drive_folder(mut self, folder: impl Into<String>) -> Self {
        let folder = folder.into();
        if !folder.trim().is_empty() {
            self.drive_folder = folder;
        }
        self
    }

    /// Fills values not given explicitly from a saved project.
    pub fn with_saved_credentials(mut self, saved: &Credentials) -> Self {
        if self.gemini_api_key.is_none() {
            self.gemini_api_key = non_blank(saved.gemini_api_key.clone());
        }
        if self.drive_access_token.is_none() {
            self.drive_access_token = non_blank(saved.drive_access_token.clone());
        }
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            gemini_api_key: self.gemini_api_key.clone(),
            drive_access_token: self.drive_access_token.clone(),
        }
    }

    pub fn require_gemini_key(&self) -> Result<String> {
        self.gemini_api_key.clone().ok_or_else(|| {
            ReelError::Config(
                "GEMINI_API_KEY not found. Please set it via --gemini-api-key or the GEMINI_API_KEY environment variable"
                    .to_string(),
            )
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win_over_saved_ones() {
        let saved = Credentials {
            gemini_api_key: Some("saved-key".into()),
            drive_access_token: Some("saved-token".into()),
        };
        let settings = Settings::new("p.json".into(), Some("cli-key".into()), None)
            .with_saved_credentials(&saved);

        assert_eq!(settings.gemini_api_key.as_deref(), Some("cli-key"));
        assert_eq!(settings.drive_access_token.as_deref(), Some("saved-token"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let settings = Settings::new("p.json".into(), Some("   ".into()), Some(String::new()));
        assert!(settings.gemini_api_key.is_none());
        assert!(settings.drive_access_token.is_none());
        assert!(matches!(
            settings.require_gemini_key(),
            Err(ReelError::Config(_))
        ));
    }

    #[test]
    fn blank_drive_folder_keeps_default() {
        let settings = Settings::default().with_drive_folder("  ");
        assert_eq!(settings.drive_folder, APP_FOLDER_NAME);
    }
}
