//! Audio resampling using rubato

use anyhow::{Context, Result};
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

/// Sinc-interpolation resampler for mono audio
pub struct Resampler;

impl Resampler {
    /// Resample a mono signal from one sample rate to another
    pub fn resample(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>> {
        if from_sr == to_sr || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(
            to_sr as f64 / from_sr as f64,
            2.0,
            params,
            samples.len(),
            1,
        )
        .context("failed to build resampler")?;

        let input = vec![samples.to_vec()];
        let output = resampler
            .process(&input, None)
            .context("resampling failed")?;

        Ok(output.into_iter().next().unwrap_or_default())
    }
}
