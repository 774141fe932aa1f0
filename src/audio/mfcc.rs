//! Kaldi-style MFCC feature extraction
//!
//! Framing uses snip-edges semantics: only fully-covered frames are
//! produced, so a signal of `len` samples yields
//! `(len - frame_length) / frame_shift + 1` frames. Each frame gets
//! per-frame DC removal, preemphasis, a Hanning window, a power spectrum,
//! a 64-bin mel filterbank, log compression, an orthonormal DCT-II and
//! cepstral liftering. No dither is applied, so extraction is
//! deterministic.

use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// MFCC extraction parameters
#[derive(Debug, Clone)]
pub struct MfccConfig {
    /// Frame length in samples
    pub frame_length: usize,
    /// Frame shift in samples
    pub frame_shift: usize,
    /// Number of triangular mel filters
    pub num_mel_bins: usize,
    /// Number of cepstral coefficients kept
    pub num_ceps: usize,
    /// Low cutoff of the mel filterbank in Hz
    pub low_freq: f32,
    /// Preemphasis coefficient
    pub preemphasis: f32,
    /// Cepstral liftering constant
    pub cepstral_lifter: f32,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            frame_length: 256,
            frame_shift: 32,
            num_mel_bins: 64,
            num_ceps: 32,
            low_freq: 20.0,
            preemphasis: 0.97,
            cepstral_lifter: 22.0,
        }
    }
}

/// Row-major `(frames, coefficients)` feature matrix
#[derive(Debug, Clone)]
pub struct FeatureSequence {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl FeatureSequence {
    pub(crate) fn new(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { data, rows, cols }
    }

    /// Number of feature frames
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Coefficients per frame
    pub fn dim(&self) -> usize {
        self.cols
    }

    /// True when the sequence holds no frames
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// One feature frame
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }
}

/// MFCC extractor with precomputed window, filterbank and DCT basis
pub struct MfccExtractor {
    config: MfccConfig,
    /// Sample rate the extractor was built for
    pub sample_rate: u32,
    window: Vec<f32>,
    mel_filters: Vec<Vec<f32>>,
    dct_basis: Vec<Vec<f32>>,
    lifter: Vec<f32>,
}

impl MfccExtractor {
    /// Create an extractor for the given sample rate
    pub fn new(sample_rate: u32, config: MfccConfig) -> Self {
        let window = Self::hanning_window(config.frame_length);
        let mel_filters = Self::mel_filterbank(
            config.frame_length,
            config.num_mel_bins,
            sample_rate,
            config.low_freq,
            sample_rate as f32 / 2.0,
        );
        let dct_basis = Self::dct_matrix(config.num_ceps, config.num_mel_bins);
        let lifter = Self::lifter_coeffs(config.num_ceps, config.cepstral_lifter);

        Self {
            config,
            sample_rate,
            window,
            mel_filters,
            dct_basis,
            lifter,
        }
    }

    /// Number of frames produced for a signal of `num_samples` samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.config.frame_length {
            0
        } else {
            (num_samples - self.config.frame_length) / self.config.frame_shift + 1
        }
    }

    /// Compute the MFCC sequence for a mono signal
    pub fn compute(&self, samples: &[f32]) -> Result<FeatureSequence> {
        let n = self.config.frame_length;
        let num_frames = self.num_frames(samples.len());
        if num_frames == 0 {
            anyhow::bail!(
                "audio too short for feature extraction: {} samples, need at least {}",
                samples.len(),
                n
            );
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        let n_freqs = n / 2 + 1;

        let mut out = Vec::with_capacity(num_frames * self.config.num_ceps);
        let mut frame = vec![0.0f32; n];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n];
        let mut power = vec![0.0f32; n_freqs];
        let mut log_mel = vec![0.0f32; self.config.num_mel_bins];

        for f in 0..num_frames {
            let start = f * self.config.frame_shift;
            frame.copy_from_slice(&samples[start..start + n]);

            // Per-frame DC offset removal
            let mean = frame.iter().sum::<f32>() / n as f32;
            for s in frame.iter_mut() {
                *s -= mean;
            }

            // Preemphasis; the first sample is preemphasized against itself
            for j in (1..n).rev() {
                frame[j] -= self.config.preemphasis * frame[j - 1];
            }
            frame[0] -= self.config.preemphasis * frame[0];

            for (b, (s, w)) in buffer.iter_mut().zip(frame.iter().zip(&self.window)) {
                *b = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);
            for (p, c) in power.iter_mut().zip(&buffer[..n_freqs]) {
                *p = c.norm_sqr();
            }

            for (m, filter) in self.mel_filters.iter().enumerate() {
                let energy: f32 = filter.iter().zip(&power).map(|(f, p)| f * p).sum();
                log_mel[m] = energy.max(1e-10).ln();
            }

            for (k, basis) in self.dct_basis.iter().enumerate() {
                let cep: f32 = basis.iter().zip(&log_mel).map(|(b, m)| b * m).sum();
                out.push(cep * self.lifter[k]);
            }
        }

        Ok(FeatureSequence::new(
            out,
            num_frames,
            self.config.num_ceps,
        ))
    }

    /// Symmetric Hanning window
    fn hanning_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (size - 1) as f32).cos())
            .collect()
    }

    /// Hz to Mel conversion
    fn hz_to_mel(hz: f32) -> f32 {
        2595.0 * (1.0 + hz / 700.0).log10()
    }

    /// Mel to Hz conversion
    fn mel_to_hz(mel: f32) -> f32 {
        700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
    }

    /// Triangular mel filterbank over the positive FFT bins
    fn mel_filterbank(n_fft: usize, n_mels: usize, sr: u32, fmin: f32, fmax: f32) -> Vec<Vec<f32>> {
        let n_freqs = n_fft / 2 + 1;
        let freq_bins: Vec<f32> = (0..n_freqs)
            .map(|i| i as f32 * sr as f32 / n_fft as f32)
            .collect();

        let mel_min = Self::hz_to_mel(fmin);
        let mel_max = Self::hz_to_mel(fmax);
        let mel_points: Vec<f32> = (0..n_mels + 2)
            .map(|i| Self::mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
            .collect();

        let mut filters = vec![vec![0.0; n_freqs]; n_mels];
        for i in 0..n_mels {
            let left = mel_points[i];
            let center = mel_points[i + 1];
            let right = mel_points[i + 2];

            for (j, &freq) in freq_bins.iter().enumerate() {
                if freq >= left && freq <= center {
                    filters[i][j] = (freq - left) / (center - left);
                } else if freq > center && freq <= right {
                    filters[i][j] = (right - freq) / (right - center);
                }
            }
        }

        filters
    }

    /// Orthonormal DCT-II basis, `num_ceps` rows over `n_mels` inputs
    fn dct_matrix(num_ceps: usize, n_mels: usize) -> Vec<Vec<f32>> {
        let norm0 = (1.0 / n_mels as f32).sqrt();
        let norm = (2.0 / n_mels as f32).sqrt();
        (0..num_ceps)
            .map(|k| {
                let scale = if k == 0 { norm0 } else { norm };
                (0..n_mels)
                    .map(|n| scale * (PI * k as f32 * (n as f32 + 0.5) / n_mels as f32).cos())
                    .collect()
            })
            .collect()
    }

    /// Cepstral liftering coefficients
    fn lifter_coeffs(num_ceps: usize, q: f32) -> Vec<f32> {
        (0..num_ceps)
            .map(|k| 1.0 + q / 2.0 * (PI * k as f32 / q).sin())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, sr: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sr).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_frame_count_formula() {
        let extractor = MfccExtractor::new(16_000, MfccConfig::default());
        assert_eq!(extractor.num_frames(255), 0);
        assert_eq!(extractor.num_frames(256), 1);
        assert_eq!(extractor.num_frames(287), 1);
        assert_eq!(extractor.num_frames(288), 2);
        // Two seconds at 16 kHz
        assert_eq!(extractor.num_frames(32_000), 993);
    }

    #[test]
    fn test_output_shape() {
        let extractor = MfccExtractor::new(16_000, MfccConfig::default());
        let features = extractor.compute(&sine(32_000, 440.0, 16_000.0)).unwrap();
        assert_eq!(features.rows(), 993);
        assert_eq!(features.dim(), 32);
        assert_eq!(features.row(0).len(), 32);
    }

    #[test]
    fn test_deterministic() {
        let extractor = MfccExtractor::new(16_000, MfccConfig::default());
        let samples = sine(8_000, 220.0, 16_000.0);
        let a = extractor.compute(&samples).unwrap();
        let b = extractor.compute(&samples).unwrap();
        for i in 0..a.rows() {
            assert_eq!(a.row(i), b.row(i));
        }
    }

    #[test]
    fn test_all_finite() {
        let extractor = MfccExtractor::new(16_000, MfccConfig::default());
        // A constant signal collapses to the log floor after DC removal
        for samples in [sine(4_096, 1000.0, 16_000.0), vec![0.25f32; 4_096]] {
            let features = extractor.compute(&samples).unwrap();
            for i in 0..features.rows() {
                assert!(features.row(i).iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_too_short_rejected() {
        let extractor = MfccExtractor::new(16_000, MfccConfig::default());
        assert!(extractor.compute(&[0.0; 100]).is_err());
    }
}
