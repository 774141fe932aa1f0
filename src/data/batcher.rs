//! Parallel batch preparation
//!
//! Epoch planning shuffles the sample indices with a seeded RNG and splits
//! them into fixed-size batches (the trailing partial batch is kept).
//! Batch loading fans the per-sample work out over a dedicated rayon pool
//! while keeping index, input and target aligned in delivery order.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;

use super::{FrameSampler, Sample};

/// One prepared batch in host memory
#[derive(Debug, Clone)]
pub struct HostBatch {
    /// Animation frame index per example
    pub frames: Vec<u32>,
    /// Flattened example inputs, concatenated in order
    pub inputs: Vec<f32>,
    /// Flattened example targets, concatenated in order
    pub targets: Vec<f32>,
    /// Number of examples
    pub len: usize,
}

/// Shuffles, splits and prepares batches over a worker pool
pub struct BatchLoader {
    sampler: Arc<FrameSampler>,
    batch_size: usize,
    seed: u64,
    pool: rayon::ThreadPool,
}

impl BatchLoader {
    /// Create a loader with `workers` preparation threads
    pub fn new(
        sampler: Arc<FrameSampler>,
        batch_size: usize,
        workers: usize,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to build batch worker pool")?;
        Ok(Self {
            sampler,
            batch_size,
            seed,
            pool,
        })
    }

    /// The sampler batches are drawn from
    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    /// Batches per epoch, counting the trailing partial batch
    pub fn num_batches(&self) -> usize {
        (self.sampler.len() + self.batch_size - 1) / self.batch_size
    }

    /// Shuffled batch index lists for one epoch
    pub fn plan_epoch(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.sampler.len()).collect();
        let mut rng = StdRng::seed_from_u64(sample_seed(self.seed, epoch, usize::MAX));
        order.shuffle(&mut rng);
        order
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Prepare one batch; delivery order follows `indices`
    pub fn load(&self, indices: &[usize], epoch: usize) -> Result<HostBatch> {
        let sampler = &self.sampler;
        let seed = self.seed;
        let samples: Vec<Sample> = self.pool.install(|| {
            indices
                .par_iter()
                .map(|&i| {
                    let mut rng = StdRng::seed_from_u64(sample_seed(seed, epoch, i));
                    sampler.sample(i as i64, &mut rng)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let input_len = samples.first().map_or(0, |s| s.input.len());
        let target_len = samples.first().map_or(0, |s| s.target.len());
        let mut frames = Vec::with_capacity(samples.len());
        let mut inputs = Vec::with_capacity(samples.len() * input_len);
        let mut targets = Vec::with_capacity(samples.len() * target_len);
        let len = samples.len();
        for sample in samples {
            frames.push(sample.frame);
            inputs.extend(sample.input);
            targets.extend(sample.target);
        }

        Ok(HostBatch {
            frames,
            inputs,
            targets,
            len,
        })
    }
}

/// Independent per-sample RNG stream; keeps jitter draws identical no
/// matter which worker picks the sample up
fn sample_seed(base: u64, epoch: usize, index: usize) -> u64 {
    let mut z = base
        ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FeatureSequence;
    use crate::data::npy::write_npy_f32;
    use crate::data::{SampleMode, TargetStore, WINDOW_ROWS};
    use std::path::Path;

    fn preview_sampler(frames: usize) -> Arc<FrameSampler> {
        let rows = 200;
        let dim = 3;
        let data: Vec<f32> = (0..rows)
            .flat_map(|r| std::iter::repeat(r as f32).take(dim))
            .collect();
        Arc::new(
            FrameSampler::new(
                FeatureSequence::new(data, rows, dim),
                frames,
                4,
                SampleMode::Preview,
            )
            .unwrap(),
        )
    }

    fn train_sampler(dir: &Path, frames: usize) -> Arc<FrameSampler> {
        let vertex_dim = 4;
        for file_no in 1..=frames {
            let path = dir.join(format!("mask.{:05}.npy", file_no));
            write_npy_f32(path, &vec![0.1; vertex_dim], &[vertex_dim]).unwrap();
        }
        let rows = 200;
        let data: Vec<f32> = (0..rows * 2).map(|v| v as f32 * 0.01).collect();
        Arc::new(
            FrameSampler::new(
                FeatureSequence::new(data, rows, 2),
                frames,
                vertex_dim,
                SampleMode::Train {
                    targets: TargetStore::new(dir, vertex_dim),
                    jitter: true,
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_plan_covers_every_index_once() {
        let loader = BatchLoader::new(preview_sampler(101), 8, 2, 1).unwrap();
        let plan = loader.plan_epoch(0);
        assert_eq!(plan.len(), loader.num_batches());
        assert_eq!(plan.len(), 13);
        assert_eq!(plan.last().unwrap().len(), 5);

        let mut seen: Vec<usize> = plan.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_plan_is_seeded() {
        let loader = BatchLoader::new(preview_sampler(101), 8, 2, 1).unwrap();
        assert_eq!(loader.plan_epoch(3), loader.plan_epoch(3));
        assert_ne!(loader.plan_epoch(3), loader.plan_epoch(4));
    }

    #[test]
    fn test_load_preserves_order() {
        let loader = BatchLoader::new(preview_sampler(20), 8, 3, 1).unwrap();
        let batch = loader.load(&[5, 2, 11], 0).unwrap();
        assert_eq!(batch.frames, vec![5, 2, 11]);
        assert_eq!(batch.len, 3);
        assert_eq!(batch.inputs.len(), 3 * WINDOW_ROWS * 3);
        assert_eq!(batch.targets.len(), 3 * 4);
    }

    #[test]
    fn test_load_is_reproducible_across_worker_counts() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = train_sampler(dir.path(), 12);
        let many = BatchLoader::new(Arc::clone(&sampler), 4, 4, 9).unwrap();
        let one = BatchLoader::new(sampler, 4, 1, 9).unwrap();

        let a = many.load(&[0, 3, 7, 10], 5).unwrap();
        let b = one.load(&[0, 3, 7, 10], 5).unwrap();
        assert_eq!(a.frames, b.frames);
        assert_eq!(a.inputs, b.inputs);
        assert_eq!(a.targets, b.targets);
    }
}
