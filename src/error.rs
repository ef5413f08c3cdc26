use thiserror::Error;

use crate::generation::Activity;

#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Couldn't find any scenes in your script. Check the format and try again.")]
    ParseEmpty,

    #[error("{0}")]
    Provider(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Another operation is already running: {0}")]
    Busy(Activity),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, ReelError>;
