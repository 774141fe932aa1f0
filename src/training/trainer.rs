//! End-to-end training loop
//!
//! Wires audio features, the on-disk target frames, the regressor and
//! the optimizer into one run: extract features once, then iterate
//! shuffled paired-frame batches, stepping Adam on the composite loss.
//! Scalars land in per-series CSV files and checkpoints are written on
//! a fixed epoch cadence plus once at the end, so a stopped run always
//! leaves usable weights behind.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use tracing::{debug, info};

use crate::audio::{AudioLoader, MfccConfig, MfccExtractor};
use crate::config::PipelineConfig;
use crate::data::{frame_count, BatchLoader, FrameSampler, HostBatch, SampleMode, TargetStore, WINDOW_ROWS};
use crate::models::{initial_table, Conditioning, VertexRegressor, INPUT_WIDTH};

use super::checkpoint::{run_stamp, CheckpointWriter};
use super::losses::{composite, LossBreakdown};
use super::metrics::ScalarLogger;

const LOG_EVERY: usize = 50;

/// Summary of a finished (or interrupted) run.
#[derive(Debug)]
pub struct TrainOutcome {
    /// Fully completed epochs.
    pub epochs_run: usize,
    /// Loss terms of the last optimizer step.
    pub last: LossBreakdown,
    /// Path of the closing checkpoint.
    pub final_checkpoint: PathBuf,
    /// Run identifier the logs and checkpoints are filed under.
    pub run: String,
}

/// Owns one training run from audio analysis to the final checkpoint.
pub struct Trainer {
    config: PipelineConfig,
    device: Device,
    varmap: VarMap,
    model: VertexRegressor,
    optimizer: AdamW,
    loader: BatchLoader,
    logger: ScalarLogger,
    checkpoints: CheckpointWriter,
    stop: Arc<AtomicBool>,
    run: String,
    frame_count: usize,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("run", &self.run)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl Trainer {
    /// Prepares a training run for the configured clip: loads and
    /// analyses the audio, indexes the target frames, builds the model
    /// and seeds the mood table.
    pub fn new(config: PipelineConfig, device: Device) -> Result<Self> {
        config.validate()?;

        let audio_path = config.audio_path();
        let waveform = AudioLoader::load(&audio_path, crate::TARGET_SAMPLE_RATE)
            .with_context(|| format!("failed to prepare audio: {}", audio_path.display()))?;
        let extractor = MfccExtractor::new(waveform.sample_rate, MfccConfig::default());
        let features = extractor
            .compute(&waveform.samples)
            .with_context(|| format!("feature extraction failed: {}", audio_path.display()))?;
        let frames = frame_count(config.anim_fps, waveform.duration_secs());
        info!(
            rows = features.rows(),
            frames,
            duration = format!("{:.2}s", waveform.duration_secs()),
            "analysed {}",
            audio_path.display()
        );

        let targets = TargetStore::new(config.target_dir(), config.vertex_dim());
        let sampler = FrameSampler::new(
            features,
            frames,
            config.vertex_dim(),
            SampleMode::Train {
                targets,
                jitter: config.jitter,
            },
        )?;
        let loader = BatchLoader::new(
            Arc::new(sampler),
            config.batch_size,
            config.workers,
            config.seed,
        )?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = VertexRegressor::new(
            frames,
            config.mood_dim,
            config.vertex_dim(),
            &varmap,
            vb,
        )?;
        let moods = initial_table(
            frames,
            config.mood_dim,
            config.smooth_mood_init,
            config.mood_filter_window,
            config.seed,
            &device,
        )?;
        model.mood().set_rows(&moods)?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let run = run_stamp();
        let logger = ScalarLogger::create(config.logs_dir().join(&run))?;
        let checkpoints = CheckpointWriter::create(&config.model_dir(), &run)?;

        Ok(Self {
            config,
            device,
            varmap,
            model,
            optimizer,
            loader,
            logger,
            checkpoints,
            stop: Arc::new(AtomicBool::new(false)),
            run,
            frame_count: frames,
        })
    }

    /// Flag that makes `train` finish early after the current batch.
    /// The closing checkpoint is still written.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Timestamp identifier of this run.
    pub fn run_id(&self) -> &str {
        &self.run
    }

    /// Animation frames the training clip covers.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Runs the configured number of epochs and writes the closing
    /// checkpoint. Scalars are logged once per epoch from the last
    /// batch of that epoch.
    pub fn train(&mut self) -> Result<TrainOutcome> {
        let epochs = self.config.epochs;
        info!(
            epochs,
            examples = self.loader.sampler().len(),
            batches = self.loader.num_batches(),
            "starting run {}",
            self.run
        );

        let started = Instant::now();
        let mut last = LossBreakdown {
            shape: 0.0,
            motion: 0.0,
            emotion: 0.0,
        };
        let mut epochs_run = 0;

        'epochs: for epoch in 0..epochs {
            for indices in self.loader.plan_epoch(epoch) {
                if self.stop.load(Ordering::Relaxed) {
                    info!("stop requested, closing out during epoch {}", epoch + 1);
                    break 'epochs;
                }
                let batch = self
                    .loader
                    .load(&indices, epoch)
                    .context("batch preparation failed")?;
                last = self.step(epoch, batch)?;
            }
            epochs_run = epoch + 1;

            self.logger.log("shape", epochs_run, last.shape)?;
            self.logger.log("motion", epochs_run, last.motion)?;
            self.logger.log("emotion", epochs_run, last.emotion)?;

            if epochs_run % LOG_EVERY == 0 || epochs_run == epochs {
                info!(
                    epoch = epochs_run,
                    shape = last.shape,
                    motion = last.motion,
                    emotion = last.emotion,
                    elapsed = format!("{:.1}s", started.elapsed().as_secs_f64()),
                    "epoch complete"
                );
            } else {
                debug!(
                    epoch = epochs_run,
                    shape = last.shape,
                    motion = last.motion,
                    emotion = last.emotion,
                    "epoch complete"
                );
            }

            if epochs_run % self.config.checkpoint_every == 0 {
                let path = self.checkpoints.save_epoch(&self.varmap, epochs_run)?;
                debug!("wrote checkpoint {}", path.display());
            }
        }

        let final_checkpoint = self.checkpoints.save_final(&self.varmap)?;
        info!(
            epochs_run,
            elapsed = format!("{:.1}s", started.elapsed().as_secs_f64()),
            "wrote final checkpoint {}",
            final_checkpoint.display()
        );

        Ok(TrainOutcome {
            epochs_run,
            last,
            final_checkpoint,
            run: self.run.clone(),
        })
    }

    /// One optimizer step over a prepared batch. Windows arrive pair
    /// interleaved, so the frame ids for conditioning follow the same
    /// `i, i+1, i, i+1` order.
    fn step(&mut self, epoch: usize, batch: HostBatch) -> Result<LossBreakdown> {
        let n = batch.len;
        let vertex_dim = self.model.vertex_dim();

        let windows = Tensor::from_vec(
            batch.inputs,
            (2 * n, 1, WINDOW_ROWS, INPUT_WIDTH),
            &self.device,
        )?;
        let ids: Vec<u32> = batch.frames.iter().flat_map(|&f| [f, f + 1]).collect();
        let ids = Tensor::from_vec(ids, 2 * n, &self.device)?;

        let predictions = self
            .model
            .forward_t(&windows, &Conditioning::ByIndex(ids), true)?
            .reshape((n, 2, vertex_dim))?;
        let targets = Tensor::from_vec(batch.targets, (n, 2, vertex_dim), &self.device)?;

        let next: Vec<u32> = batch.frames.iter().map(|&f| f + 1).collect();
        let mood_now = self
            .model
            .mood()
            .rows_for(&Tensor::from_vec(batch.frames, n, &self.device)?)?;
        let mood_next = self
            .model
            .mood()
            .rows_for(&Tensor::from_vec(next, n, &self.device)?)?;

        let (total, breakdown) = composite(&predictions, &targets, &mood_now, &mood_next)?;
        if !breakdown.is_finite() {
            anyhow::bail!(
                "training diverged: non-finite loss in epoch {} ({:?})",
                epoch + 1,
                breakdown
            );
        }
        self.optimizer
            .backward_step(&total)
            .context("optimizer step failed")?;
        Ok(breakdown)
    }
}
