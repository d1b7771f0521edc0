//! Spectral-mask enhancement using RNNoise via nnnoiseless
//!
//! RNNoise predicts per-band gains with a small recurrent network whose
//! weights are compiled into the crate, so loading cannot fail.

use std::path::Path;

use nnnoiseless::DenoiseState;

use super::filters::PreFilter;
use super::{resample, Enhancer};
use crate::audio_util::WavAudio;
use crate::config::{Device, RnnoiseSettings};
use crate::error::EnhancementError;

/// RNNoise frame size (fixed at 480 samples at 48kHz = 10ms)
const RNNOISE_FRAME_SIZE: usize = 480;
/// RNNoise sample rate (fixed at 48kHz)
const RNNOISE_SAMPLE_RATE: u32 = 48000;
/// RNNoise works on i16-range floats
const PCM_SCALE: f32 = 32767.0;

pub struct RnnoiseEnhancer {
    settings: RnnoiseSettings,
}

impl RnnoiseEnhancer {
    /// RNNoise only has a CPU implementation; asking for CUDA is an error.
    pub fn new(settings: RnnoiseSettings, device: Device) -> Result<Self, EnhancementError> {
        if device != Device::Cpu {
            return Err(EnhancementError::DeviceUnavailable(format!(
                "rnnoise runs on cpu only, {} requested",
                device
            )));
        }
        Ok(Self {
            settings: RnnoiseSettings {
                strength: settings.strength.clamp(0.0, 1.0),
                ..settings
            },
        })
    }

    /// Denoise one channel in place
    fn process_channel(
        &self,
        samples: &mut [f32],
        sample_rate: u32,
    ) -> Result<(), EnhancementError> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut prefilter = PreFilter::for_channel(&self.settings, sample_rate as f32, samples)?;
        if !prefilter.is_empty() {
            prefilter.process(samples);
        }

        if self.settings.strength <= 0.0 {
            return Ok(());
        }

        let dry: Vec<f32> = samples.to_vec();
        let at_48k = resample(&dry, sample_rate, RNNOISE_SAMPLE_RATE)?;
        let denoised_48k = run_rnnoise(&at_48k);
        let mut wet = resample(&denoised_48k, RNNOISE_SAMPLE_RATE, sample_rate)?;
        wet.resize(samples.len(), 0.0);

        let strength = self.settings.strength;
        for ((sample, d), w) in samples.iter_mut().zip(&dry).zip(&wet) {
            *sample = d * (1.0 - strength) + w * strength;
        }

        Ok(())
    }
}

/// Run 48kHz audio through RNNoise in 480-sample frames
fn run_rnnoise(samples: &[f32]) -> Vec<f32> {
    let mut state = DenoiseState::new();
    let mut output = Vec::with_capacity(samples.len());

    let mut input_frame = [0.0f32; RNNOISE_FRAME_SIZE];
    let mut output_frame = [0.0f32; RNNOISE_FRAME_SIZE];

    for chunk in samples.chunks(RNNOISE_FRAME_SIZE) {
        // Last frame is zero-padded
        input_frame.fill(0.0);
        for (dst, src) in input_frame.iter_mut().zip(chunk) {
            *dst = src * PCM_SCALE;
        }

        state.process_frame(&mut output_frame, &input_frame);
        output.extend(output_frame[..chunk.len()].iter().map(|s| s / PCM_SCALE));
    }

    output
}

impl Enhancer for RnnoiseEnhancer {
    fn name(&self) -> &'static str {
        "rnnoise"
    }

    fn enhance(&self, input: &Path, output: &Path) -> Result<(), EnhancementError> {
        log::debug!("RNNoise enhancing {:?} -> {:?}", input, output);
        let audio = WavAudio::read(input)?;
        let sample_rate = audio.sample_rate();

        let mut channels = audio.deinterleave();
        for channel in channels.iter_mut() {
            self.process_channel(channel, sample_rate)?;
        }

        WavAudio::from_channels(audio.spec, &channels).write(output)?;
        log::info!("RNNoise output -> {:?}", output);
        Ok(())
    }
}
