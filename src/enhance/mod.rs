//! Speech-enhancement backends
//!
//! Every backend turns one WAV file into a denoised WAV file with the same
//! sample rate, channel count and bit depth:
//! 1. `rnnoise` - spectral-mask network (RNNoise via nnnoiseless)
//! 2. `demucs` - source separation, keeping the vocals stem
//! 3. `onnx` - waveform restoration model run through ONNX Runtime
//! 4. `passthrough` - identity copy

pub mod demucs;
pub mod filters;
pub mod onnx;
pub mod rnnoise;

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::config::{EnhancerKind, PipelineConfig};
use crate::error::{EnhancementError, PipelineError};

pub use demucs::DemucsEnhancer;
pub use onnx::OnnxEnhancer;
pub use rnnoise::RnnoiseEnhancer;

/// A speech-enhancement backend.
///
/// Implementations must be deterministic for identical input and weights,
/// and must leave the audio format untouched.
pub trait Enhancer {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Transform `input` into a denoised `output`, overwriting it if present.
    fn enhance(&self, input: &Path, output: &Path) -> Result<(), EnhancementError>;
}

/// Copies its input unchanged
pub struct PassthroughEnhancer;

impl Enhancer for PassthroughEnhancer {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn enhance(&self, input: &Path, output: &Path) -> Result<(), EnhancementError> {
        std::fs::copy(input, output)?;
        Ok(())
    }
}

/// Construct the backend selected in `config`.
///
/// Model weights and devices are checked here, so a bad selection fails
/// before anything is downloaded.
pub fn build_enhancer(config: &PipelineConfig) -> Result<Box<dyn Enhancer>, PipelineError> {
    let enhancer: Box<dyn Enhancer> = match config.enhancer {
        EnhancerKind::Rnnoise => {
            Box::new(RnnoiseEnhancer::new(config.rnnoise.clone(), config.device)?)
        }
        EnhancerKind::Demucs => {
            Box::new(DemucsEnhancer::new(config.demucs.clone(), config.device)?)
        }
        EnhancerKind::Onnx => Box::new(OnnxEnhancer::new(&config.onnx, config.device)?),
        EnhancerKind::Passthrough => Box::new(PassthroughEnhancer),
    };
    log::info!("Enhancer: {} on {}", enhancer.name(), config.device);
    Ok(enhancer)
}

/// Input frames handed to the resampler per call
const RESAMPLE_CHUNK: usize = 8192;

/// Resample one channel with a windowed-sinc interpolator.
///
/// Input is fed in fixed-size chunks so working memory does not grow with
/// the file. The filter delay is dropped and the result is trimmed or
/// zero-padded to `len * to / from` samples, so round trips line up with
/// the original.
pub(crate) fn resample(
    samples: &[f32],
    from: u32,
    to: u32,
) -> Result<Vec<f32>, EnhancementError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to as f64 / from as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| EnhancementError::Inference(format!("Failed to create resampler: {}", e)))?;
    let resample_err = |e: rubato::ResampleError| {
        EnhancementError::Inference(format!("Failed to resample {} -> {} Hz: {}", from, to, e))
    };

    let target_len = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut resampled = Vec::with_capacity(target_len + delay);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let out = resampler.process(&[chunk], None).map_err(resample_err)?;
        resampled.extend_from_slice(&out[0]);
    }
    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let out = resampler
            .process_partial(Some(&[remainder][..]), None)
            .map_err(resample_err)?;
        resampled.extend_from_slice(&out[0]);
    }

    // Flush the samples still held back by the filter delay
    while resampled.len() < target_len + delay {
        let out = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_err)?;
        if out[0].is_empty() {
            break;
        }
        resampled.extend_from_slice(&out[0]);
    }

    resampled.drain(..delay.min(resampled.len()));
    resampled.resize(target_len, 0.0);
    Ok(resampled)
}
