//! Waveform restoration through ONNX Runtime
//!
//! Accepts any graph with one `[1, n]` float waveform input and a float
//! waveform output at the same rate. Audio is resampled to the model rate,
//! fed in fixed windows and resampled back.

use std::path::Path;
use std::sync::Mutex;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

use super::{resample, Enhancer};
use crate::audio_util::WavAudio;
use crate::config::{Device, OnnxSettings};
use crate::error::EnhancementError;

pub struct OnnxEnhancer {
    /// `run` needs `&mut Session`; the enhancer contract is `&self`
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    sample_rate: u32,
    chunk_len: usize,
}

impl OnnxEnhancer {
    pub fn new(settings: &OnnxSettings, device: Device) -> Result<Self, EnhancementError> {
        let model_path = settings.model_path.as_deref().ok_or_else(|| {
            EnhancementError::ModelLoad(
                "no restoration model configured (set onnx.modelPath or --onnx-model)".to_string(),
            )
        })?;
        if !model_path.is_file() {
            return Err(EnhancementError::ModelLoad(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }
        if settings.sample_rate == 0 || settings.chunk_seconds <= 0.0 {
            return Err(EnhancementError::ModelLoad(format!(
                "invalid model window: {} Hz x {} s",
                settings.sample_rate, settings.chunk_seconds
            )));
        }

        // Environment is a process-wide singleton; repeated commits are no-ops
        let _ = ort::init().commit();

        let mut builder = Session::builder()
            .map_err(|e| {
                EnhancementError::ModelLoad(format!("Failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                EnhancementError::ModelLoad(format!("Failed to set optimization level: {}", e))
            })?;

        if device == Device::Cuda {
            let cuda = ort::ep::CUDA::default().build().error_on_failure();
            builder = builder
                .with_execution_providers([cuda])
                .map_err(|e| {
                    EnhancementError::DeviceUnavailable(format!("CUDA execution provider: {}", e))
                })?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| EnhancementError::ModelLoad(format!("Failed to load ONNX model: {}", e)))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| EnhancementError::ModelLoad("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| EnhancementError::ModelLoad("model declares no outputs".to_string()))?;

        log::info!(
            "Loaded restoration model {} on {} ({} -> {})",
            model_path.display(),
            device,
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            sample_rate: settings.sample_rate,
            chunk_len: window_len(settings.sample_rate, settings.chunk_seconds),
        })
    }

    /// Run one window through the model; the result has the window's length
    fn infer(&self, window: &[f32]) -> Result<Vec<f32>, EnhancementError> {
        let array = ndarray::Array2::from_shape_vec((1, window.len()), window.to_vec())
            .map_err(|e| EnhancementError::Inference(format!("Failed to shape input: {}", e)))?;
        let tensor = Value::from_array(array)
            .map_err(|e| {
                EnhancementError::Inference(format!("Failed to create input tensor: {}", e))
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EnhancementError::Inference("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| {
                EnhancementError::Inference(format!("ONNX Runtime inference failed: {}", e))
            })?;

        let (_, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| EnhancementError::Inference(format!("Failed to extract output: {}", e)))?;

        let mut restored = data.to_vec();
        restored.resize(window.len(), 0.0);
        Ok(restored)
    }

    fn process_channel(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<f32>, EnhancementError> {
        let at_model_rate = resample(samples, sample_rate, self.sample_rate)?;

        let mut restored = Vec::with_capacity(at_model_rate.len());
        for window in at_model_rate.chunks(self.chunk_len) {
            restored.extend(self.infer(window)?);
        }

        let mut out = resample(&restored, self.sample_rate, sample_rate)?;
        out.resize(samples.len(), 0.0);
        Ok(out)
    }
}

/// Samples per inference window (at least one)
fn window_len(sample_rate: u32, chunk_seconds: f32) -> usize {
    ((sample_rate as f64 * chunk_seconds as f64).round() as usize).max(1)
}

impl Enhancer for OnnxEnhancer {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn enhance(&self, input: &Path, output: &Path) -> Result<(), EnhancementError> {
        log::debug!("ONNX restoring {:?} -> {:?}", input, output);
        let audio = WavAudio::read(input)?;

        let channels = audio
            .deinterleave()
            .iter()
            .map(|c| self.process_channel(c, audio.sample_rate()))
            .collect::<Result<Vec<_>, _>>()?;

        WavAudio::from_channels(audio.spec, &channels).write(output)?;
        log::info!("ONNX output -> {:?}", output);
        Ok(())
    }
}
