use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// A decoded PCM WAV file.
///
/// Samples are interleaved and normalised to [-1, 1]. `spec` is the spec of
/// the file the samples came from, and `write` encodes back into it, so
/// integer samples survive a read/write cycle bit-exact.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub spec: WavSpec,
    pub samples: Vec<f32>,
}

impl WavAudio {
    pub fn read(path: &Path) -> Result<Self, hound::Error> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = int_scale(spec.bits_per_sample);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self { spec, samples })
    }

    /// Build from per-channel buffers (all channels are truncated to the
    /// shortest one).
    pub fn from_channels(spec: WavSpec, channels: &[Vec<f32>]) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels.len());
        for i in 0..frames {
            for channel in channels {
                samples.push(channel[i]);
            }
        }
        Self { spec, samples }
    }

    pub fn channels(&self) -> usize {
        self.spec.channels.max(1) as usize
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Split interleaved samples into one buffer per channel
    pub fn deinterleave(&self) -> Vec<Vec<f32>> {
        let channels = self.channels();
        let mut out = vec![Vec::with_capacity(self.frames()); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (c, sample) in frame.iter().enumerate() {
                out[c].push(*sample);
            }
        }
        out
    }

    /// Sum of squared samples over all channels
    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|s| (*s as f64) * (*s as f64)).sum()
    }

    pub fn write(&self, path: &Path) -> Result<(), hound::Error> {
        let mut writer = WavWriter::create(path, self.spec)?;

        match self.spec.sample_format {
            SampleFormat::Float => {
                for sample in &self.samples {
                    writer.write_sample(*sample)?;
                }
            }
            SampleFormat::Int => {
                let scale = int_scale(self.spec.bits_per_sample);
                let (min, max) = (-scale, scale - 1.0);
                for sample in &self.samples {
                    let value = (sample * scale).round().clamp(min, max) as i32;
                    writer.write_sample(value)?;
                }
            }
        }

        writer.finalize()
    }
}

fn int_scale(bits_per_sample: u16) -> f32 {
    (1u64 << (bits_per_sample.clamp(1, 32) - 1)) as f32
}

/// Whether `cmd` can be executed: an existing path, or a name found on PATH.
pub fn which_exists(cmd: &str) -> bool {
    let as_path = Path::new(cmd);
    if as_path.components().count() > 1 {
        return as_path.is_file();
    }

    std::process::Command::new("which")
        .arg(cmd)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Move a file, falling back to copy + remove when `rename` cannot cross
/// filesystems (scratch space usually lives on a different mount).
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!("rename {:?} -> {:?} failed ({}), copying instead", from, to, e);
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Last stderr lines of a finished subprocess, for error messages
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn pcm16_spec(sample_rate: u32, channels: u16) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Write an executable `sh` script standing in for an external tool
    #[cfg(unix)]
    pub fn write_stub(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Write a sine tone with a little deterministic noise on top
    pub fn write_tone(path: &Path, spec: WavSpec, freq: f32, seconds: f32, amplitude: f32) {
        let frames = (spec.sample_rate as f32 * seconds) as usize;
        let channels: Vec<Vec<f32>> = (0..spec.channels)
            .map(|_| {
                (0..frames)
                    .map(|i| {
                        let t = i as f32 / spec.sample_rate as f32;
                        amplitude * (freq * 2.0 * std::f32::consts::PI * t).sin()
                            + 0.01 * ((i * 7919) % 97) as f32 / 97.0
                    })
                    .collect()
            })
            .collect();
        WavAudio::from_channels(spec, &channels).write(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_int_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_tone(&a, pcm16_spec(48000, 2), 440.0, 0.1, 0.5);

        WavAudio::read(&a).unwrap().write(&b).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_deinterleave_and_rebuild() {
        let spec = pcm16_spec(16000, 2);
        let audio = WavAudio { spec, samples: vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3] };
        let channels = audio.deinterleave();
        assert_eq!(channels, vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]]);
        assert_eq!(WavAudio::from_channels(spec, &channels).samples, audio.samples);
        assert_eq!(audio.frames(), 3);
    }

    #[test]
    fn test_write_clamps_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loud.wav");
        let audio = WavAudio { spec: pcm16_spec(8000, 1), samples: vec![2.0, -2.0] };
        audio.write(&path).unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let values: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(values, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_move_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from.bin");
        let to = dir.path().join("to.bin");
        std::fs::write(&from, b"payload").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let err = b"1\n2\n\n3\n4\n5\n6\n7\n";
        assert_eq!(stderr_tail(err), "3\n4\n5\n6\n7");
    }
}
