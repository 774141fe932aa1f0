//! Temporal alignment and paired-frame sampling
//!
//! Animation frames are mapped onto the denser feature timeline by the
//! ratio `feature_rows / frame_count`. Each sampled example carries a
//! 64-row context window per frame (±32 feature frames around the mapped
//! position); windows that extend past either end of the feature sequence
//! wrap around circularly rather than padding or failing. Training
//! examples pair frames `i` and `i + 1` and share one jitter draw; preview
//! examples are single windows with zero targets.

use anyhow::Result;
use rand::{rngs::StdRng, Rng};

use super::TargetStore;
use crate::audio::FeatureSequence;

/// Rows of audio context per input tile
pub const WINDOW_ROWS: usize = 64;

const HALF_WINDOW: usize = WINDOW_ROWS / 2;

/// Number of animation frames covered by a clip duration
pub fn frame_count(anim_fps: f64, duration_secs: f64) -> usize {
    (anim_fps * duration_secs).round() as usize
}

/// Sampling mode
pub enum SampleMode {
    /// Paired examples read on-disk targets; jitter shifts the window by
    /// zero or one feature row
    Train {
        /// Target store for the clip
        targets: TargetStore,
        /// Apply the jitter augmentation
        jitter: bool,
    },
    /// Single windows with an all-zero target placeholder
    Preview,
}

/// One prepared example
#[derive(Debug, Clone)]
pub struct Sample {
    /// Animation frame index the example starts at
    pub frame: u32,
    /// Flattened input windows: `2 * 64 * dim` in training, `64 * dim` in preview
    pub input: Vec<f32>,
    /// Flattened targets: `2 * vertex_dim` in training, `vertex_dim` zeros in preview
    pub target: Vec<f32>,
}

/// Maps animation-frame indices to feature windows and targets
pub struct FrameSampler {
    features: FeatureSequence,
    frame_count: usize,
    vertex_dim: usize,
    mode: SampleMode,
}

impl FrameSampler {
    /// Create a sampler over an extracted feature sequence
    pub fn new(
        features: FeatureSequence,
        frame_count: usize,
        vertex_dim: usize,
        mode: SampleMode,
    ) -> Result<Self> {
        if features.is_empty() {
            anyhow::bail!("feature sequence is empty");
        }
        match &mode {
            SampleMode::Train { targets, .. } => {
                if frame_count < 2 {
                    anyhow::bail!(
                        "clip covers {} animation frames, need at least 2 to form pairs",
                        frame_count
                    );
                }
                if targets.vertex_dim() != vertex_dim {
                    anyhow::bail!(
                        "target store expects {} values per frame, sampler expects {}",
                        targets.vertex_dim(),
                        vertex_dim
                    );
                }
            }
            SampleMode::Preview => {
                if frame_count == 0 {
                    anyhow::bail!("clip covers no animation frames");
                }
            }
        }
        Ok(Self {
            features,
            frame_count,
            vertex_dim,
            mode,
        })
    }

    /// Number of samples: `frame_count - 1` in training (the last frame has
    /// no successor), `frame_count` in preview
    pub fn len(&self) -> usize {
        match self.mode {
            SampleMode::Train { .. } => self.frame_count - 1,
            SampleMode::Preview => self.frame_count,
        }
    }

    /// True when the sampler yields no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Animation frames covered by the clip
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Vertex-offset vector length per frame
    pub fn vertex_dim(&self) -> usize {
        self.vertex_dim
    }

    /// Coefficients per feature row
    pub fn feature_dim(&self) -> usize {
        self.features.dim()
    }

    /// True in preview mode
    pub fn is_preview(&self) -> bool {
        matches!(self.mode, SampleMode::Preview)
    }

    /// Resolve a possibly-negative index against the sampler length
    pub fn resolve_index(&self, index: i64) -> Result<usize> {
        let len = self.len() as i64;
        let wrapped = if index < 0 { index + len } else { index };
        if wrapped < 0 || wrapped >= len {
            anyhow::bail!("frame index {} out of range for {} samples", index, len);
        }
        Ok(wrapped as usize)
    }

    /// Prepare the example for `index`; the RNG feeds the jitter draw
    pub fn sample(&self, index: i64, rng: &mut StdRng) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        match &self.mode {
            SampleMode::Train { targets, jitter } => {
                // One draw covers both windows of the pair
                let shift = if *jitter { rng.gen_range(0..=1) } else { 0 };
                let mut input = Vec::with_capacity(2 * WINDOW_ROWS * self.features.dim());
                self.append_window(self.audio_index(i, shift), &mut input);
                self.append_window(self.audio_index(i + 1, shift), &mut input);
                let target = targets.load_pair(i)?;
                Ok(Sample {
                    frame: i as u32,
                    input,
                    target,
                })
            }
            SampleMode::Preview => {
                let mut input = Vec::with_capacity(WINDOW_ROWS * self.features.dim());
                self.append_window(self.audio_index(i, 0), &mut input);
                Ok(Sample {
                    frame: i as u32,
                    input,
                    target: vec![0.0; self.vertex_dim],
                })
            }
        }
    }

    /// Feature row the animation frame maps to
    fn audio_index(&self, frame: usize, shift: usize) -> usize {
        let ratio = self.features.rows() as f64 / self.frame_count as f64;
        (frame as f64 * ratio) as usize + shift
    }

    /// Append rows `[center - 32, center + 32)`, wrapping circularly
    fn append_window(&self, center: usize, out: &mut Vec<f32>) {
        let rows = self.features.rows() as i64;
        for k in 0..WINDOW_ROWS as i64 {
            let row = (center as i64 - HALF_WINDOW as i64 + k).rem_euclid(rows) as usize;
            out.extend_from_slice(self.features.row(row));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::npy::write_npy_f32;
    use rand::SeedableRng;
    use std::path::Path;

    /// Feature sequence where every value of row `r` equals `r`
    fn ramp_features(rows: usize, dim: usize) -> FeatureSequence {
        let data: Vec<f32> = (0..rows)
            .flat_map(|r| std::iter::repeat(r as f32).take(dim))
            .collect();
        FeatureSequence::new(data, rows, dim)
    }

    fn write_zero_targets(dir: &Path, frames: usize, vertex_dim: usize) {
        for file_no in 1..=frames {
            let path = dir.join(format!("mask.{:05}.npy", file_no));
            write_npy_f32(path, &vec![0.0; vertex_dim], &[vertex_dim]).unwrap();
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_frame_count_rounds() {
        assert_eq!(frame_count(29.97, 2.0), 60);
        assert_eq!(frame_count(29.97, 1.0), 30);
        assert_eq!(frame_count(29.97, 0.6), 18);
    }

    #[test]
    fn test_train_sample_shapes() {
        let dir = tempfile::tempdir().unwrap();
        write_zero_targets(dir.path(), 10, 6);
        let sampler = FrameSampler::new(
            ramp_features(300, 4),
            10,
            6,
            SampleMode::Train {
                targets: TargetStore::new(dir.path(), 6),
                jitter: true,
            },
        )
        .unwrap();

        assert_eq!(sampler.len(), 9);
        for i in 0..sampler.len() as i64 {
            let sample = sampler.sample(i, &mut rng()).unwrap();
            assert_eq!(sample.input.len(), 2 * WINDOW_ROWS * 4);
            assert_eq!(sample.target.len(), 12);
            assert_eq!(sample.frame, i as u32);
        }
    }

    #[test]
    fn test_preview_sample_shapes() {
        let sampler =
            FrameSampler::new(ramp_features(300, 4), 10, 6, SampleMode::Preview).unwrap();
        assert_eq!(sampler.len(), 10);
        let sample = sampler.sample(9, &mut rng()).unwrap();
        assert_eq!(sample.input.len(), WINDOW_ROWS * 4);
        assert_eq!(sample.target, vec![0.0; 6]);
    }

    #[test]
    fn test_window_wraps_at_start() {
        let rows = 100;
        let dim = 3;
        let sampler =
            FrameSampler::new(ramp_features(rows, dim), 10, 6, SampleMode::Preview).unwrap();

        // Frame 0 maps to feature row 0, so the window covers rows
        // [-32, 32) and the leading rows come from the tail of the sequence
        let sample = sampler.sample(0, &mut rng()).unwrap();
        for k in 0..WINDOW_ROWS {
            let expected = (k as i64 - 32).rem_euclid(rows as i64) as f32;
            for d in 0..dim {
                assert_eq!(sample.input[k * dim + d], expected, "row {k}");
            }
        }
        assert_eq!(sample.input[0], 68.0);
        assert_eq!(sample.input[32 * dim], 0.0);
    }

    #[test]
    fn test_window_wraps_at_end() {
        let rows = 100;
        let sampler = FrameSampler::new(ramp_features(rows, 1), 10, 6, SampleMode::Preview).unwrap();

        // Frame 9 maps to feature row 90; rows 122..132 wrap to 22..32
        let sample = sampler.sample(9, &mut rng()).unwrap();
        assert_eq!(sample.input[0], 58.0);
        assert_eq!(sample.input[41], 99.0);
        assert_eq!(sample.input[42], 0.0);
        assert_eq!(sample.input[63], 21.0);
    }

    #[test]
    fn test_negative_index_wraps_to_length() {
        let dir = tempfile::tempdir().unwrap();
        write_zero_targets(dir.path(), 10, 3);
        let sampler = FrameSampler::new(
            ramp_features(250, 2),
            10,
            3,
            SampleMode::Train {
                targets: TargetStore::new(dir.path(), 3),
                jitter: false,
            },
        )
        .unwrap();

        // len == frame_count - 1 == 9, so -1 resolves to frame 8
        let last = sampler.sample(-1, &mut rng()).unwrap();
        let direct = sampler.sample(8, &mut rng()).unwrap();
        assert_eq!(last.frame, 8);
        assert_eq!(last.input, direct.input);
        assert_eq!(last.target, direct.target);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let sampler = FrameSampler::new(ramp_features(250, 2), 10, 3, SampleMode::Preview).unwrap();
        assert!(sampler.sample(10, &mut rng()).is_err());
        assert!(sampler.sample(-11, &mut rng()).is_err());
        assert!(sampler.sample(-10, &mut rng()).is_ok());
    }

    #[test]
    fn test_jitter_shifts_by_at_most_one_row() {
        let dir = tempfile::tempdir().unwrap();
        write_zero_targets(dir.path(), 10, 3);
        let features = ramp_features(250, 1);
        let jittered = FrameSampler::new(
            features.clone(),
            10,
            3,
            SampleMode::Train {
                targets: TargetStore::new(dir.path(), 3),
                jitter: true,
            },
        )
        .unwrap();
        let plain = FrameSampler::new(
            features,
            10,
            3,
            SampleMode::Train {
                targets: TargetStore::new(dir.path(), 3),
                jitter: false,
            },
        )
        .unwrap();

        let base = plain.sample(4, &mut rng()).unwrap();
        let mut seen_shift = [false, false];
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = jittered.sample(4, &mut rng).unwrap();
            if sample.input == base.input {
                seen_shift[0] = true;
            } else {
                // Shifted by one feature row
                assert_eq!(sample.input[0], base.input[0] + 1.0);
                seen_shift[1] = true;
            }
        }
        assert!(seen_shift[0] && seen_shift[1]);
    }

    #[test]
    fn test_sampling_is_deterministic_per_seed() {
        let dir = tempfile::tempdir().unwrap();
        write_zero_targets(dir.path(), 10, 3);
        let sampler = FrameSampler::new(
            ramp_features(250, 2),
            10,
            3,
            SampleMode::Train {
                targets: TargetStore::new(dir.path(), 3),
                jitter: true,
            },
        )
        .unwrap();

        let a = sampler.sample(3, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = sampler.sample(3, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a.input, b.input);
    }
}
