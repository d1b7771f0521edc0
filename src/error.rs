//! Error taxonomy for the cleaning pipeline.
//!
//! Fetch and enhancement errors abort a run. Diarisation errors that report
//! the model as unavailable are recoverable: callers drop the diarizer and
//! carry on with enhancement only.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Failure to pull the audio track from the source URL.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid source URL: {0:?}")]
    InvalidUrl(String),
    #[error("Downloader exited with {status}: {stderr}")]
    ToolFailed { status: ExitStatus, stderr: String },
    #[error("Downloader finished but {0} was not written")]
    MissingOutput(PathBuf),
    #[error("Downloaded file {path} is not readable PCM WAV: {reason}")]
    InvalidAudio { path: PathBuf, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside an enhancement backend.
#[derive(Debug, thiserror::Error)]
pub enum EnhancementError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error("Invalid filter settings: {0}")]
    FilterSettings(String),
    #[error("Compute device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Enhancer tool exited with {status}: {stderr}")]
    Tool { status: ExitStatus, stderr: String },
    #[error("Audio error: {0}")]
    Audio(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside a diarisation backend.
#[derive(Debug, thiserror::Error)]
pub enum DiarizationError {
    #[error("Diarisation credential missing: set {0}")]
    MissingCredential(String),
    #[error("Diarisation model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Diarisation tool exited with {status}: {stderr}")]
    Tool { status: ExitStatus, stderr: String },
    #[error("Malformed RTTM at line {line}: {reason}")]
    Rttm { line: usize, reason: String },
    #[error("Speaker count must be at least 1")]
    InvalidSpeakerCount,
    #[error("Audio error: {0}")]
    Audio(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiarizationError {
    /// True when the backend cannot run at all (as opposed to failing on
    /// this particular input). The pipeline skips diarisation in that case.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DiarizationError::MissingCredential(_) | DiarizationError::ModelUnavailable(_)
        )
    }
}

/// Failure to read a pipeline configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Top-level error surfaced by a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Environment error: {0}")]
    Environment(String),
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),
    #[error("Enhancement error: {0}")]
    Enhancement(#[from] EnhancementError),
    #[error("Diarisation error: {0}")]
    Diarization(#[from] DiarizationError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
