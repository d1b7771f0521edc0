//! Speaker diarisation
//!
//! A backend only has to say who spoke when. Ranking speakers by energy and
//! silencing everyone outside the top K is shared by all backends.

pub mod pyannote;
pub mod rttm;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::audio_util::WavAudio;
use crate::config::{DiarizationSettings, Device};
use crate::error::DiarizationError;

pub use pyannote::PyannoteDiarizer;

/// One contiguous stretch of speech attributed to a speaker
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerTurn {
    /// Seconds from the start of the file
    pub start: f64,
    pub end: f64,
    pub label: String,
}

/// A speaker-diarisation backend.
pub trait Diarizer {
    fn name(&self) -> &'static str;

    /// Run the segmentation model over `input`
    fn speaker_turns(&self, input: &Path) -> Result<Vec<SpeakerTurn>, DiarizationError>;

    /// Keep only the `k` most energetic speakers of `input` and write the
    /// masked waveform to `output` in the input's format.
    fn filter_top_speakers(
        &self,
        input: &Path,
        output: &Path,
        k: usize,
    ) -> Result<(), DiarizationError> {
        if k == 0 {
            return Err(DiarizationError::InvalidSpeakerCount);
        }

        let turns = self.speaker_turns(input)?;
        log::debug!("{} found {} speaker turns", self.name(), turns.len());

        let audio = WavAudio::read(input)?;
        let masked = mask_top_speakers(&audio, &turns, k);
        masked.write(output)?;

        log::info!("Diarised output written -> {:?}", output);
        Ok(())
    }
}

/// Frame range `[start, end)` covered by a turn, clamped to the file
fn frame_range(turn: &SpeakerTurn, sample_rate: u32, frames: usize) -> (usize, usize) {
    let to_frame = |t: f64| ((t.max(0.0) * sample_rate as f64) as usize).min(frames);
    let start = to_frame(turn.start);
    let end = to_frame(turn.end).max(start);
    (start, end)
}

/// Per-speaker energy (sum of squared samples over all channels), in order
/// of each speaker's first turn.
pub fn speaker_energy(audio: &WavAudio, turns: &[SpeakerTurn]) -> Vec<(String, f64)> {
    let channels = audio.channels();
    let frames = audio.frames();

    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<&str, f64> = HashMap::new();

    for turn in turns {
        let (start, end) = frame_range(turn, audio.sample_rate(), frames);
        let energy: f64 = audio.samples[start * channels..end * channels]
            .iter()
            .map(|s| (*s as f64) * (*s as f64))
            .sum();

        match totals.get_mut(turn.label.as_str()) {
            Some(total) => *total += energy,
            None => {
                order.push(turn.label.clone());
                totals.insert(turn.label.as_str(), energy);
            }
        }
    }

    order
        .into_iter()
        .map(|label| {
            let energy = totals.get(label.as_str()).copied().unwrap_or(0.0);
            (label, energy)
        })
        .collect()
}

/// The `k` highest-energy labels. Equal energies keep first-appearance
/// order, so the cut is deterministic.
pub fn top_speakers(energies: &[(String, f64)], k: usize) -> Vec<String> {
    let mut ranked: Vec<&(String, f64)> = energies.iter().collect();
    // stable: ties stay in first-appearance order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(k).map(|(label, _)| label.clone()).collect()
}

/// Zero every frame not covered by a turn of one of the top `k` speakers
pub fn mask_top_speakers(audio: &WavAudio, turns: &[SpeakerTurn], k: usize) -> WavAudio {
    let energies = speaker_energy(audio, turns);
    let keep: HashSet<String> = top_speakers(&energies, k).into_iter().collect();
    log::debug!("Retaining speakers: {:?}", keep);

    let channels = audio.channels();
    let frames = audio.frames();
    let mut mask = vec![false; frames];
    for turn in turns.iter().filter(|t| keep.contains(&t.label)) {
        let (start, end) = frame_range(turn, audio.sample_rate(), frames);
        mask[start..end].fill(true);
    }

    let mut samples = audio.samples.clone();
    for (frame, keep) in samples.chunks_mut(channels).zip(&mask) {
        if !keep {
            frame.fill(0.0);
        }
    }
    // Trailing partial frame (malformed input) is never covered
    let whole = frames * channels;
    samples[whole..].fill(0.0);

    WavAudio { spec: audio.spec, samples }
}

/// Try to construct the diarisation backend. Any failure (missing token,
/// gated model, no interpreter) is logged and treated as "diarisation
/// unavailable" rather than aborting.
pub fn detect(settings: &DiarizationSettings, device: Device) -> Option<Box<dyn Diarizer>> {
    match PyannoteDiarizer::new(settings.clone(), device) {
        Ok(diarizer) => {
            log::info!(
                "Diarizer: {} keeping top {} speakers",
                diarizer.name(),
                settings.num_speakers
            );
            Some(Box::new(diarizer))
        }
        Err(e) => {
            log::warn!("Diarisation disabled ({})", e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Diarizer that returns a fixed list of turns
    pub struct FixedTurns(pub Vec<SpeakerTurn>);

    impl Diarizer for FixedTurns {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn speaker_turns(&self, _input: &Path) -> Result<Vec<SpeakerTurn>, DiarizationError> {
            Ok(self.0.clone())
        }
    }

    pub fn turn(start: f64, end: f64, label: &str) -> SpeakerTurn {
        SpeakerTurn {
            start,
            end,
            label: label.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::audio_util::test_support::pcm16_spec;

    /// 1 Hz "audio": one second per speaker with distinct amplitudes
    fn staircase() -> (WavAudio, Vec<SpeakerTurn>) {
        let audio = WavAudio {
            spec: pcm16_spec(4, 1),
            samples: vec![
                0.5, 0.5, 0.5, 0.5, // A: loud
                0.1, 0.1, 0.1, 0.1, // B: quiet
                0.3, 0.3, 0.3, 0.3, // C: medium
                0.9, 0.9, 0.9, 0.9, // no turn
            ],
        };
        let turns = vec![turn(0.0, 1.0, "A"), turn(1.0, 2.0, "B"), turn(2.0, 3.0, "C")];
        (audio, turns)
    }

    #[test]
    fn test_energy_in_first_appearance_order() {
        let (audio, mut turns) = staircase();
        turns.push(turn(0.0, 0.5, "B"));
        let energies = speaker_energy(&audio, &turns);
        let labels: Vec<&str> = energies.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, ["A", "B", "C"]);
        assert!((energies[0].1 - 1.0).abs() < 1e-4);
        // B: its own second plus the first half of A's
        assert!((energies[1].1 - (0.04 + 0.5)).abs() < 1e-4);
    }

    #[test]
    fn test_top_speakers_ranks_by_energy() {
        let (audio, turns) = staircase();
        let energies = speaker_energy(&audio, &turns);
        assert_eq!(top_speakers(&energies, 2), ["A", "C"]);
        assert_eq!(top_speakers(&energies, 10), ["A", "C", "B"]);
    }

    #[test]
    fn test_ties_break_by_first_appearance() {
        let energies = vec![
            ("late".to_string(), 1.0),
            ("early".to_string(), 2.0),
            ("tied".to_string(), 1.0),
        ];
        assert_eq!(top_speakers(&energies, 2), ["early", "late"]);
    }

    #[test]
    fn test_mask_silences_other_speakers_and_gaps() {
        let (audio, turns) = staircase();
        let masked = mask_top_speakers(&audio, &turns, 1);
        assert_eq!(&masked.samples[0..4], &[0.5; 4]);
        assert!(masked.samples[4..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_more_speakers_never_quieter() {
        let (audio, turns) = staircase();
        let mut previous = 0.0;
        for k in 1..=4 {
            let energy = mask_top_speakers(&audio, &turns, k).energy();
            assert!(energy >= previous);
            previous = energy;
        }
    }

    #[test]
    fn test_turns_past_end_are_clamped() {
        let audio = WavAudio {
            spec: pcm16_spec(4, 2),
            samples: vec![0.2; 8],
        };
        let masked = mask_top_speakers(&audio, &[turn(0.5, 99.0, "A")], 1);
        assert_eq!(masked.samples, vec![0.0, 0.0, 0.0, 0.0, 0.2, 0.2, 0.2, 0.2]);
    }

    #[test]
    fn test_filter_top_speakers_writes_masked_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("enhanced.wav");
        let output = dir.path().join("clean.wav");
        let (audio, turns) = staircase();
        audio.write(&input).unwrap();

        FixedTurns(turns).filter_top_speakers(&input, &output, 2).unwrap();

        let written = WavAudio::read(&output).unwrap();
        assert_eq!(written.spec, audio.spec);
        assert!((written.samples[0] - 0.5).abs() < 1e-3);
        assert_eq!(written.samples[4], 0.0);
        assert!((written.samples[8] - 0.3).abs() < 1e-3);
        assert_eq!(written.samples[12], 0.0);
    }

    #[test]
    fn test_zero_speakers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.wav");
        let result = FixedTurns(vec![]).filter_top_speakers(&path, &path, 0);
        assert!(matches!(result, Err(DiarizationError::InvalidSpeakerCount)));
    }

    #[test]
    fn test_detect_without_token_is_none() {
        let settings = DiarizationSettings {
            token_env: "DEBATE_CLEAN_TEST_UNSET_TOKEN".to_string(),
            ..DiarizationSettings::default()
        };
        assert!(detect(&settings, Device::Cpu).is_none());
    }
}
