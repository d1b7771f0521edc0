//! IIR pre-filters run ahead of the RNNoise network
//!
//! Rumble and mains hum sit below the band RNNoise models well, so they are
//! removed with biquads first.

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};

use crate::config::RnnoiseSettings;
use crate::error::EnhancementError;

/// Cascaded 2nd-order sections give 24 dB/octave slopes
fn butterworth_pair(
    kind: Type<f32>,
    label: &str,
    sample_rate: f32,
    freq: f32,
) -> Result<[DirectForm1<f32>; 2], EnhancementError> {
    if freq <= 0.0 || freq >= sample_rate / 2.0 {
        return Err(EnhancementError::FilterSettings(format!(
            "{} corner {} Hz outside (0, {}) Hz",
            label,
            freq,
            sample_rate / 2.0
        )));
    }
    let coeffs =
        Coefficients::<f32>::from_params(kind, sample_rate.hz(), freq.hz(), Q_BUTTERWORTH_F32)
            .map_err(|e| {
                EnhancementError::FilterSettings(format!("{} at {} Hz: {:?}", label, freq, e))
            })?;
    Ok([DirectForm1::<f32>::new(coeffs), DirectForm1::<f32>::new(coeffs)])
}

/// Per-channel filter chain: optional high-pass, optional low-pass, then a
/// notch bank on the mains fundamental and harmonics.
pub struct PreFilter {
    highpass: Option<[DirectForm1<f32>; 2]>,
    lowpass: Option<[DirectForm1<f32>; 2]>,
    notches: Vec<DirectForm1<f32>>,
}

impl PreFilter {
    /// Build the chain for one channel. `samples` is only used to detect
    /// whether the recording carries 50 Hz or 60 Hz hum.
    pub fn for_channel(
        settings: &RnnoiseSettings,
        sample_rate: f32,
        samples: &[f32],
    ) -> Result<Self, EnhancementError> {
        let highpass = settings
            .highpass_hz
            .map(|f| butterworth_pair(Type::HighPass, "high-pass", sample_rate, f))
            .transpose()?;
        let lowpass = settings
            .lowpass_hz
            .map(|f| butterworth_pair(Type::LowPass, "low-pass", sample_rate, f))
            .transpose()?;

        let mut notches = Vec::new();
        if settings.hum_removal {
            let mains = detect_mains_frequency(samples, sample_rate);
            log::debug!("Notching {} Hz mains hum ({} harmonics)", mains, settings.hum_harmonics);

            // Narrow Q keeps speech energy next to the harmonics
            let q = 30.0;
            for h in 1..=settings.hum_harmonics.clamp(1, 4) {
                let freq = mains * h as f32;
                if freq >= sample_rate / 2.0 {
                    continue;
                }
                let coeffs = Coefficients::<f32>::from_params(
                    Type::Notch,
                    sample_rate.hz(),
                    freq.hz(),
                    q,
                )
                .map_err(|e| {
                    EnhancementError::FilterSettings(format!("notch at {} Hz: {:?}", freq, e))
                })?;
                notches.push(DirectForm1::<f32>::new(coeffs));
            }
        }

        Ok(Self { highpass, lowpass, notches })
    }

    pub fn is_empty(&self) -> bool {
        self.highpass.is_none() && self.lowpass.is_none() && self.notches.is_empty()
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for stage in [&mut self.highpass, &mut self.lowpass].into_iter().flatten() {
            for filter in stage.iter_mut() {
                for sample in samples.iter_mut() {
                    *sample = filter.run(*sample);
                }
            }
        }

        for notch in self.notches.iter_mut() {
            for sample in samples.iter_mut() {
                *sample = notch.run(*sample);
            }
        }
    }
}

/// Detect whether audio contains 50Hz or 60Hz mains hum
///
/// Compares spectral energy at the first four harmonics of each.
pub fn detect_mains_frequency(samples: &[f32], sample_rate: f32) -> f32 {
    use realfft::RealFftPlanner;

    let fft_size = 8192;

    if samples.len() < fft_size {
        return 60.0;
    }

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    // Hann-windowed first block
    let mut buffer: Vec<f32> = samples[..fft_size]
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
            let window = 0.5 * (1.0 - phase.cos());
            s * window
        })
        .collect();

    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buffer, &mut spectrum).is_err() {
        return 60.0;
    }

    let freq_resolution = sample_rate / fft_size as f32;
    let harmonic_energy = |fundamental: f32| -> f32 {
        (1..=4)
            .filter_map(|h| {
                let bin = (fundamental * h as f32 / freq_resolution).round() as usize;
                spectrum.get(bin).map(|c| c.norm_sqr())
            })
            .sum()
    };

    let energy_50 = harmonic_energy(50.0);
    let energy_60 = harmonic_energy(60.0);

    // 60 Hz wins unless 50 Hz is clearly stronger
    if energy_50 > energy_60 * 1.2 {
        50.0
    } else {
        60.0
    }
}
