//! Speaker turns from pyannote.audio's pretrained diarisation pipeline
//!
//! The pipeline is gated on the Hugging Face hub, so a token must be present
//! in the environment. It runs in a Python subprocess that prints RTTM.

use std::path::Path;
use std::process::Command;

use super::rttm::parse_rttm;
use super::{Diarizer, SpeakerTurn};
use crate::audio_util::{stderr_tail, which_exists};
use crate::config::{DiarizationSettings, Device};
use crate::error::DiarizationError;

/// argv: model id, device, wav path, name of the token variable
const DRIVER: &str = r#"
import os, sys
from pyannote.audio import Pipeline
model, device, wav = sys.argv[1], sys.argv[2], sys.argv[3]
token = os.environ.get(sys.argv[4])
pipeline = Pipeline.from_pretrained(model, use_auth_token=token)
if pipeline is None:
    sys.stderr.write("pipeline unavailable: gated model or invalid token\n")
    sys.exit(3)
if device != "cpu":
    import torch
    pipeline.to(torch.device(device))
pipeline(wav).write_rttm(sys.stdout)
"#;

/// Exit code the driver uses when the model cannot be loaded
const EXIT_UNAVAILABLE: i32 = 3;

pub struct PyannoteDiarizer {
    settings: DiarizationSettings,
    device: Device,
}

impl PyannoteDiarizer {
    pub fn new(settings: DiarizationSettings, device: Device) -> Result<Self, DiarizationError> {
        let token = std::env::var(&settings.token_env).unwrap_or_default();
        if token.trim().is_empty() {
            return Err(DiarizationError::MissingCredential(settings.token_env.clone()));
        }
        if !which_exists(&settings.python) {
            return Err(DiarizationError::ModelUnavailable(format!(
                "{} not found on PATH",
                settings.python
            )));
        }
        Ok(Self { settings, device })
    }

    fn command(&self, input: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.python);
        cmd.args(["-c", DRIVER, self.settings.model.as_str(), self.device.as_str()])
            .arg(input)
            .arg(&self.settings.token_env);
        cmd
    }
}

/// Whether a failed run means the model could not be obtained at all
fn looks_unavailable(code: Option<i32>, stderr: &str) -> bool {
    if code == Some(EXIT_UNAVAILABLE) {
        return true;
    }
    let stderr = stderr.to_ascii_lowercase();
    // HTTP phrasing only; bare status codes collide with traceback line numbers
    [
        "gated",
        "401 client error",
        "403 client error",
        "unauthorized",
        "modulenotfounderror",
    ]
        .iter()
        .any(|needle| stderr.contains(needle))
}

impl Diarizer for PyannoteDiarizer {
    fn name(&self) -> &'static str {
        "pyannote"
    }

    fn speaker_turns(&self, input: &Path) -> Result<Vec<SpeakerTurn>, DiarizationError> {
        let mut cmd = self.command(input);
        log::debug!("Running pyannote {} on {:?}", self.settings.model, input);

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            if looks_unavailable(output.status.code(), &stderr) {
                return Err(DiarizationError::ModelUnavailable(stderr));
            }
            return Err(DiarizationError::Tool {
                status: output.status,
                stderr,
            });
        }

        parse_rttm(&String::from_utf8_lossy(&output.stdout))
    }
}
