//! Pipeline configuration.
//!
//! Loaded from an optional camelCase JSON file and then overridden by CLI
//! flags. Once handed to [`crate::pipeline::Pipeline`] it is never mutated.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Compute device for model backends
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("Unknown device '{}' (expected cpu or cuda)", other)),
        }
    }
}

/// Which enhancement backend to run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EnhancerKind {
    /// RNNoise spectral-mask network (in-process)
    #[default]
    Rnnoise,
    /// Demucs vocal/accompaniment separation (Python subprocess)
    Demucs,
    /// Waveform restoration model run through ONNX Runtime
    Onnx,
    /// Identity copy
    Passthrough,
}

impl fmt::Display for EnhancerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnhancerKind::Rnnoise => "rnnoise",
            EnhancerKind::Demucs => "demucs",
            EnhancerKind::Onnx => "onnx",
            EnhancerKind::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

impl FromStr for EnhancerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rnnoise" => Ok(EnhancerKind::Rnnoise),
            "demucs" => Ok(EnhancerKind::Demucs),
            "onnx" => Ok(EnhancerKind::Onnx),
            "passthrough" | "none" => Ok(EnhancerKind::Passthrough),
            other => Err(format!(
                "Unknown enhancer '{}' (expected rnnoise, demucs, onnx or passthrough)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    /// Downloader executable (must be on PATH)
    pub downloader: String,
    /// Sample rate ffmpeg converts the extracted track to
    pub sample_rate: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            downloader: "yt-dlp".to_string(),
            sample_rate: 48000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RnnoiseSettings {
    /// Blend strength (0.0 = original, 1.0 = fully denoised)
    pub strength: f32,
    /// High-pass corner applied before denoising
    pub highpass_hz: Option<f32>,
    /// Low-pass corner applied before denoising
    pub lowpass_hz: Option<f32>,
    /// Notch out 50/60 Hz mains hum (frequency auto-detected)
    pub hum_removal: bool,
    /// Number of hum harmonics to notch (1-4)
    pub hum_harmonics: u32,
}

impl Default for RnnoiseSettings {
    fn default() -> Self {
        Self {
            strength: 1.0,
            highpass_hz: Some(80.0),
            lowpass_hz: None,
            hum_removal: true,
            hum_harmonics: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DemucsSettings {
    pub python: String,
    pub model: String,
}

impl Default for DemucsSettings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            model: "htdemucs_ft".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OnnxSettings {
    /// Path to a waveform-in/waveform-out `.onnx` graph
    pub model_path: Option<PathBuf>,
    /// Sample rate the model was trained at
    pub sample_rate: u32,
    /// Length of each inference window
    pub chunk_seconds: f32,
}

impl Default for OnnxSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            sample_rate: 16000,
            chunk_seconds: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DiarizationSettings {
    /// How many distinct voices to keep
    pub num_speakers: usize,
    pub python: String,
    /// Pretrained pipeline identifier on the Hugging Face hub
    pub model: String,
    /// Environment variable holding the hub access token
    pub token_env: String,
}

impl Default for DiarizationSettings {
    fn default() -> Self {
        Self {
            num_speakers: 2,
            python: "python3".to_string(),
            model: "pyannote/speaker-diarization@2.1".to_string(),
            token_env: "HUGGING_FACE_HUB_TOKEN".to_string(),
        }
    }
}

/// Everything one pipeline run needs to know
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Directory holding the final (and any retained) artifacts
    pub work_dir: PathBuf,
    pub device: Device,
    pub enhancer: EnhancerKind,
    /// `None` disables diarisation
    pub diarization: Option<DiarizationSettings>,
    /// Copy the raw download (and pre-diarisation audio) into `work_dir`
    pub keep_intermediates: bool,
    pub fetch: FetchSettings,
    pub rnnoise: RnnoiseSettings,
    pub demucs: DemucsSettings,
    pub onnx: OnnxSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./output"),
            device: Device::Cpu,
            enhancer: EnhancerKind::Rnnoise,
            diarization: Some(DiarizationSettings::default()),
            keep_intermediates: false,
            fetch: FetchSettings::default(),
            rnnoise: RnnoiseSettings::default(),
            demucs: DemucsSettings::default(),
            onnx: OnnxSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
