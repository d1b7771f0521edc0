//! Audio download via yt-dlp
//!
//! Pulls only the audio track and has ffmpeg re-encode it to 16-bit PCM WAV
//! at a fixed sample rate, ready for the enhancement models.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::audio_util::{stderr_tail, which_exists};
use crate::config::FetchSettings;
use crate::error::{DownloadError, PipelineError};

/// File name of the fetched track inside the destination directory
pub const RAW_AUDIO_FILE: &str = "raw_audio.wav";

/// Something that turns a source URL into a local WAV file.
pub trait AudioFetcher {
    /// Download `url` into `dest_dir`, overwriting any previous download,
    /// and return the WAV path.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, PipelineError>;
}

pub struct YtDlpFetcher {
    settings: FetchSettings,
}

impl YtDlpFetcher {
    /// Fails if ffmpeg (used by yt-dlp to re-mux) or the downloader itself
    /// is missing from PATH.
    pub fn new(settings: FetchSettings) -> Result<Self, PipelineError> {
        if !which_exists("ffmpeg") {
            return Err(PipelineError::Environment(
                "ffmpeg not found on PATH. Please install it.".to_string(),
            ));
        }
        if !which_exists(&settings.downloader) {
            return Err(PipelineError::Environment(format!(
                "{} not found on PATH. Please install it.",
                settings.downloader
            )));
        }
        Ok(Self { settings })
    }

    fn command(&self, url: &str, dest_dir: &Path) -> Command {
        // yt-dlp fills in the extension after extraction
        let template = dest_dir.join("raw_audio.%(ext)s");
        let postprocessor = format!(
            "ExtractAudio:-ar {} -acodec pcm_s16le",
            self.settings.sample_rate
        );

        let mut cmd = Command::new(&self.settings.downloader);
        cmd.args(["-x", "--audio-format", "wav"])
            .args(["--no-playlist", "--force-overwrites"])
            .args(["--postprocessor-args", postprocessor.as_str()])
            .arg("--output")
            .arg(template)
            .arg(url);
        cmd
    }
}

/// Confirm the downloaded file decodes as WAV
fn validate_wav(path: &Path) -> Result<(), DownloadError> {
    let reader = hound::WavReader::open(path).map_err(|e| DownloadError::InvalidAudio {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let spec = reader.spec();
    log::debug!(
        "Fetched {} Hz, {} ch, {}-bit audio ({} frames)",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        reader.duration()
    );
    Ok(())
}

impl AudioFetcher for YtDlpFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, PipelineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidUrl(url.to_string()).into());
        }

        std::fs::create_dir_all(dest_dir)?;
        let wav_target = dest_dir.join(RAW_AUDIO_FILE);
        if wav_target.exists() {
            std::fs::remove_file(&wav_target)?;
        }

        let mut cmd = self.command(url, dest_dir);
        log::debug!("Running shell command: {:?}", cmd);

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::Environment(format!(
                    "{} could not be started: {}",
                    self.settings.downloader, e
                )));
            }
            Err(e) => return Err(DownloadError::Io(e).into()),
        };

        if !output.status.success() {
            return Err(DownloadError::ToolFailed {
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            }
            .into());
        }

        if !wav_target.exists() {
            return Err(DownloadError::MissingOutput(wav_target).into());
        }
        validate_wav(&wav_target)?;

        log::info!("Downloaded audio -> {:?}", wav_target);
        Ok(wav_target)
    }
}
