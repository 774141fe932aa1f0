//! Preview pipeline for trained checkpoints
//!
//! Rebuilds the regressor around a saved checkpoint and predicts
//! vertex offsets for every animation frame of an audio clip. The
//! clip does not need target frames, so previewing works on unseen
//! speech. Emotional state comes either from a learned mood row of
//! the training clip or from an explicit vector.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use rand::{rngs::StdRng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::audio::{AudioLoader, MfccConfig, MfccExtractor};
use crate::config::PipelineConfig;
use crate::data::{frame_count, write_npy_f32, FrameSampler, SampleMode, WINDOW_ROWS};
use crate::models::{Conditioning, VertexRegressor};
use crate::training::mood_rows_in;

const PREVIEW_BATCH: usize = 256;

/// Where the emotional state for a preview comes from.
pub enum MoodSource {
    /// Reuse a learned mood row of the training clip by frame id.
    Frame(usize),
    /// Condition every frame on this explicit vector.
    Vector(Vec<f32>),
}

/// Checkpoint plus analysed audio, ready to predict a clip.
pub struct PreviewPipeline {
    config: PipelineConfig,
    device: Device,
    model: VertexRegressor,
    sampler: FrameSampler,
    mood_rows: usize,
}

impl PreviewPipeline {
    /// Loads a checkpoint and analyses `audio` for previewing.
    ///
    /// The mood table size is read out of the checkpoint first so the
    /// rebuilt model matches the training clip it came from.
    pub fn new(
        checkpoint: &Path,
        audio: &Path,
        config: PipelineConfig,
        device: Device,
    ) -> Result<Self> {
        config.validate_model()?;
        let mood_rows = mood_rows_in(checkpoint, &device)?;

        let waveform = AudioLoader::load(audio, crate::TARGET_SAMPLE_RATE)
            .with_context(|| format!("failed to prepare audio: {}", audio.display()))?;
        let extractor = MfccExtractor::new(waveform.sample_rate, MfccConfig::default());
        let features = extractor
            .compute(&waveform.samples)
            .with_context(|| format!("feature extraction failed: {}", audio.display()))?;
        let frames = frame_count(config.anim_fps, waveform.duration_secs());
        let sampler = FrameSampler::new(features, frames, config.vertex_dim(), SampleMode::Preview)?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = VertexRegressor::new(
            mood_rows,
            config.mood_dim,
            config.vertex_dim(),
            &varmap,
            vb,
        )?;
        varmap
            .load(checkpoint)
            .with_context(|| format!("failed to load checkpoint: {}", checkpoint.display()))?;
        info!(
            frames,
            mood_rows,
            "loaded {} for preview of {}",
            checkpoint.display(),
            audio.display()
        );

        Ok(Self {
            config,
            device,
            model,
            sampler,
            mood_rows,
        })
    }

    /// Animation frames the analysed clip covers.
    pub fn frame_count(&self) -> usize {
        self.sampler.frame_count()
    }

    /// Rows in the checkpoint's mood table.
    pub fn mood_rows(&self) -> usize {
        self.mood_rows
    }

    /// Predicts vertex offsets for every frame of the clip, one
    /// `vertex_dim` vector per frame.
    pub fn run(&self, mood: &MoodSource) -> Result<Vec<Vec<f32>>> {
        match mood {
            MoodSource::Frame(id) => {
                if *id >= self.mood_rows {
                    anyhow::bail!(
                        "mood frame {id} out of range, checkpoint has {} rows",
                        self.mood_rows
                    );
                }
            }
            MoodSource::Vector(v) => {
                if v.len() != self.config.mood_dim {
                    anyhow::bail!(
                        "mood vector has {} components, model expects {}",
                        v.len(),
                        self.config.mood_dim
                    );
                }
            }
        }

        let frames = self.sampler.len();
        let dim = self.sampler.feature_dim();
        let mut rng = StdRng::seed_from_u64(0);
        let mut outputs = Vec::with_capacity(frames);
        for start in (0..frames).step_by(PREVIEW_BATCH) {
            let count = PREVIEW_BATCH.min(frames - start);
            let mut inputs = Vec::with_capacity(count * WINDOW_ROWS * dim);
            for i in start..start + count {
                let sample = self.sampler.sample(i as i64, &mut rng)?;
                inputs.extend(sample.input);
            }
            let windows =
                Tensor::from_vec(inputs, (count, 1, WINDOW_ROWS, dim), &self.device)?;
            let conditioning = match mood {
                MoodSource::Frame(id) => Conditioning::ByIndex(Tensor::from_vec(
                    vec![*id as u32; count],
                    count,
                    &self.device,
                )?),
                MoodSource::Vector(v) => Conditioning::ByVector(Tensor::from_vec(
                    v.clone(),
                    (1, v.len()),
                    &self.device,
                )?),
            };
            let preds = self.model.forward_t(&windows, &conditioning, false)?;
            outputs.extend(preds.to_vec2::<f32>()?);
        }
        Ok(outputs)
    }

    /// Writes one `pred.<n>.npy` per frame into `dir`, numbered from 1
    /// like the target frames.
    pub fn write_frames(&self, dir: &Path, predictions: &[Vec<f32>]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
        let mut paths = Vec::with_capacity(predictions.len());
        for (i, frame) in predictions.iter().enumerate() {
            let path = dir.join(format!("pred.{:05}.npy", i + 1));
            write_npy_f32(&path, frame, &[frame.len()])?;
            paths.push(path);
        }
        Ok(paths)
    }
}
