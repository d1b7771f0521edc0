//! Crowd-noise suppression by source separation with Demucs
//!
//! Demucs is driven through its Python CLI in two-stem mode and only the
//! vocals stem is kept. Demucs writes at its own model rate (44.1kHz stereo),
//! so the stem is converted back to the input's format afterwards.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{resample, Enhancer};
use crate::audio_util::{stderr_tail, which_exists, WavAudio};
use crate::config::{DemucsSettings, Device};
use crate::error::{EnhancementError, PipelineError};

pub struct DemucsEnhancer {
    settings: DemucsSettings,
    device: Device,
}

impl DemucsEnhancer {
    /// Checks that the interpreter, the `demucs` package and (for CUDA) a
    /// CUDA-enabled torch are all present.
    pub fn new(settings: DemucsSettings, device: Device) -> Result<Self, PipelineError> {
        if !which_exists(&settings.python) {
            return Err(PipelineError::Environment(format!(
                "{} not found on PATH. Please install it.",
                settings.python
            )));
        }

        if !python_succeeds(&settings.python, "import demucs")? {
            return Err(EnhancementError::ModelLoad(format!(
                "demucs is not importable from {} (pip install demucs)",
                settings.python
            ))
            .into());
        }

        if device == Device::Cuda
            && !python_succeeds(
                &settings.python,
                "import sys, torch; sys.exit(0 if torch.cuda.is_available() else 1)",
            )?
        {
            return Err(EnhancementError::DeviceUnavailable(
                "torch reports no CUDA device".to_string(),
            )
            .into());
        }

        Ok(Self { settings, device })
    }

    /// Where Demucs puts the vocals stem for `input` under `out_dir`
    fn stem_path(&self, out_dir: &Path, input: &Path) -> PathBuf {
        let track = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        out_dir.join(&self.settings.model).join(track).join("vocals.wav")
    }

    fn command(&self, out_dir: &Path, input: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.python);
        cmd.args(["-m", "demucs", "-n", self.settings.model.as_str(), "--two-stems=vocals"])
            .args(["--device", self.device.as_str()])
            .arg("-o")
            .arg(out_dir)
            .arg(input);
        cmd
    }
}

fn python_succeeds(python: &str, code: &str) -> Result<bool, PipelineError> {
    let output = Command::new(python).args(["-c", code]).output()?;
    Ok(output.status.success())
}

/// Convert a decoded stem to the sample rate, channel count and length of
/// the reference audio.
fn conform(stem: &WavAudio, reference: &WavAudio) -> Result<WavAudio, EnhancementError> {
    let target_frames = reference.frames();
    let target_channels = reference.channels();

    let mut stem_channels: Vec<Vec<f32>> = stem
        .deinterleave()
        .iter()
        .map(|c| resample(c, stem.sample_rate(), reference.sample_rate()))
        .collect::<Result<_, _>>()?;

    if stem_channels.len() != target_channels {
        // Downmix to mono, then fan out to the target layout
        let frames = stem_channels.iter().map(Vec::len).min().unwrap_or(0);
        let count = stem_channels.len().max(1) as f32;
        let mono: Vec<f32> = (0..frames)
            .map(|i| stem_channels.iter().map(|c| c[i]).sum::<f32>() / count)
            .collect();
        stem_channels = vec![mono; target_channels];
    }

    for channel in stem_channels.iter_mut() {
        channel.resize(target_frames, 0.0);
    }

    Ok(WavAudio::from_channels(reference.spec, &stem_channels))
}

impl Enhancer for DemucsEnhancer {
    fn name(&self) -> &'static str {
        "demucs"
    }

    fn enhance(&self, input: &Path, output: &Path) -> Result<(), EnhancementError> {
        let scratch = tempfile::tempdir()?;
        let mut cmd = self.command(scratch.path(), input);
        log::debug!("Running shell command: {:?}", cmd);

        let result = cmd.output()?;
        if !result.status.success() {
            return Err(EnhancementError::Tool {
                status: result.status,
                stderr: stderr_tail(&result.stderr),
            });
        }

        let stem = self.stem_path(scratch.path(), input);
        if !stem.exists() {
            return Err(EnhancementError::Inference(format!(
                "demucs finished without writing {:?}",
                stem
            )));
        }

        let reference = WavAudio::read(input)?;
        let vocals = WavAudio::read(&stem)?;
        conform(&vocals, &reference)?.write(output)?;
        log::info!("Demucs output -> {:?}", output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_util::test_support::{pcm16_spec, write_tone};
    #[cfg(unix)]
    use crate::audio_util::test_support::write_stub;

    /// Python stand-in that finds `-o` in its arguments, then runs `action`
    /// with the stem directory in `$stem_dir`.
    #[cfg(unix)]
    fn stub_enhancer(bin_dir: &Path, action: &str) -> DemucsEnhancer {
        let body = format!(
            "\
while [ $# -gt 0 ]; do
  case \"$1\" in
    -o) out=\"$2\"; shift ;;
  esac
  shift
done
stem_dir=\"$out/htdemucs_ft/in\"
{}",
            action
        );
        let python = write_stub(bin_dir, "python3", &body);
        DemucsEnhancer {
            settings: DemucsSettings {
                python: python.to_string_lossy().into_owned(),
                ..DemucsSettings::default()
            },
            device: Device::Cpu,
        }
    }

    fn enhancer() -> DemucsEnhancer {
        DemucsEnhancer {
            settings: DemucsSettings::default(),
            device: Device::Cuda,
        }
    }

    #[test]
    fn test_missing_interpreter_is_environment_error() {
        let settings = DemucsSettings {
            python: "/nonexistent/bin/python3".to_string(),
            ..DemucsSettings::default()
        };
        assert!(matches!(
            DemucsEnhancer::new(settings, Device::Cpu),
            Err(PipelineError::Environment(_))
        ));
    }

    #[test]
    fn test_stem_path_layout() {
        let path = enhancer().stem_path(Path::new("/scratch"), Path::new("/tmp/raw_audio.wav"));
        assert_eq!(path, PathBuf::from("/scratch/htdemucs_ft/raw_audio/vocals.wav"));
    }

    #[test]
    fn test_command_line() {
        let cmd = enhancer().command(Path::new("/scratch"), Path::new("in.wav"));
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "python3");
        assert_eq!(
            args,
            [
                "-m", "demucs", "-n", "htdemucs_ft", "--two-stems=vocals", "--device", "cuda", "-o",
                "/scratch", "in.wav"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_enhance_conforms_stem_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        let stem = dir.path().join("stem.wav");
        write_tone(&input, pcm16_spec(16000, 1), 200.0, 0.5, 0.5);
        // Demucs writes 44.1kHz stereo regardless of input
        write_tone(&stem, pcm16_spec(44100, 2), 200.0, 0.5, 0.5);

        let action = format!(
            "mkdir -p \"$stem_dir\"\ncp '{}' \"$stem_dir/vocals.wav\"",
            stem.display()
        );
        stub_enhancer(dir.path(), &action).enhance(&input, &output).unwrap();

        let before = WavAudio::read(&input).unwrap();
        let after = WavAudio::read(&output).unwrap();
        assert_eq!(after.spec, before.spec);
        assert_eq!(after.frames(), before.frames());
        assert!(after.energy() > 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_enhance_without_stem_is_inference_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_tone(&input, pcm16_spec(16000, 1), 200.0, 0.1, 0.5);

        let enhancer = stub_enhancer(dir.path(), "exit 0");
        let result = enhancer.enhance(&input, &dir.path().join("out.wav"));

        assert!(matches!(
            result,
            Err(EnhancementError::Inference(msg)) if msg.contains("vocals.wav")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_enhance_nonzero_exit_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_tone(&input, pcm16_spec(16000, 1), 200.0, 0.1, 0.5);

        let enhancer = stub_enhancer(dir.path(), "echo 'CUDA out of memory' >&2\nexit 1");
        let result = enhancer.enhance(&input, &dir.path().join("out.wav"));

        assert!(matches!(
            result,
            Err(EnhancementError::Tool { ref stderr, .. }) if stderr == "CUDA out of memory"
        ));
    }

    #[test]
    fn test_conform_downmixes_and_fits_length() {
        let stem = WavAudio {
            spec: pcm16_spec(16000, 2),
            samples: vec![0.2, 0.4, 0.2, 0.4, 0.2, 0.4],
        };
        let reference = WavAudio {
            spec: pcm16_spec(16000, 1),
            samples: vec![0.0; 5],
        };

        let conformed = conform(&stem, &reference).unwrap();
        assert_eq!(conformed.spec, reference.spec);
        assert_eq!(conformed.frames(), 5);
        assert!((conformed.samples[0] - 0.3).abs() < 1e-6);
        assert_eq!(conformed.samples[4], 0.0);
    }
}
