//! Audio file loading

use anyhow::{Context, Result};
use std::path::Path;

/// Mono waveform at a known sample rate
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Samples in `[-1, 1]`, mean-removed
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the waveform holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Audio loader for the pipeline's mono input
pub struct AudioLoader;

impl AudioLoader {
    /// Load audio from a WAV file, take channel 0, resample to `target_sr`
    /// and remove the DC offset
    pub fn load<P: AsRef<Path>>(path: P, target_sr: u32) -> Result<Waveform> {
        let path = path.as_ref();

        if !path.extension().map_or(false, |e| e == "wav") {
            anyhow::bail!("unsupported audio format: {}", path.display());
        }

        let reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            anyhow::bail!("WAV file has no channels: {}", path.display());
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("failed to decode WAV samples: {}", path.display()))?,
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_value))
                    .collect::<Result<Vec<_>, _>>()
                    .with_context(|| format!("failed to decode WAV samples: {}", path.display()))?
            }
        };

        if interleaved.len() % channels != 0 {
            anyhow::bail!(
                "WAV sample count {} is not a multiple of the channel count {}: {}",
                interleaved.len(),
                channels,
                path.display()
            );
        }

        // The pipeline is mono: keep channel 0, drop the rest
        let mono: Vec<f32> = interleaved.into_iter().step_by(channels).collect();
        Self::from_samples(mono, spec.sample_rate, target_sr)
    }

    /// Build a waveform from raw mono samples, resampling and removing the
    /// DC offset as in [`AudioLoader::load`]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, target_sr: u32) -> Result<Waveform> {
        let mut samples = if sample_rate != target_sr {
            super::Resampler::resample(&samples, sample_rate, target_sr)?
        } else {
            samples
        };

        if !samples.is_empty() {
            let mean = samples.iter().sum::<f32>() / samples.len() as f32;
            for s in samples.iter_mut() {
                *s -= mean;
            }
        }

        Ok(Waveform {
            samples,
            sample_rate: target_sr,
        })
    }
}
