//! Pipeline configuration
//!
//! One configuration struct drives both training and preview. Defaults
//! carry the reference constants; a YAML file and CLI flags can override
//! them. All runtime artifacts live under a single root directory:
//!
//! ```text
//! <root>/data/<clip>/<clip>.wav          input audio
//! <root>/data/<clip>/maskSeq/mask.*.npy  per-frame vertex-offset targets
//! <root>/logs/<run>/                     per-epoch scalar logs
//! <root>/model/<run>/                    checkpoints
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the pipeline root directory
pub const ROOT_ENV_VAR: &str = "SPEECHFACE_ROOT_PATH";

fn default_root() -> PathBuf {
    if let Some(root) = std::env::var_os(ROOT_ENV_VAR) {
        return PathBuf::from(root);
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("sandbox").join("speechface")
}

/// Full configuration for the training/preview pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory holding `data/`, `logs/` and `model/`
    pub root_path: PathBuf,
    /// Clip name, resolved to `data/<clip>/<clip>.wav` and its target dir
    pub clip: String,
    /// Number of mesh vertices per frame (each contributes x/y/z offsets)
    pub vertex_count: usize,
    /// Animation frame rate the audio is aligned against
    pub anim_fps: f64,
    /// Width of the learned per-frame mood embedding
    pub mood_dim: usize,
    /// Smooth the random mood initialization along the frame axis
    pub smooth_mood_init: bool,
    /// Savitzky-Golay window for mood smoothing (odd, quadratic fit)
    pub mood_filter_window: usize,
    /// Training batch size (in paired examples)
    pub batch_size: usize,
    /// Worker threads preparing batches
    pub workers: usize,
    /// Number of training epochs
    pub epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Write a checkpoint every this many epochs
    pub checkpoint_every: usize,
    /// Apply the one-row jitter augmentation while sampling
    pub jitter: bool,
    /// Seed for shuffling, jitter and parameter initialization
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root_path: default_root(),
            clip: String::new(),
            vertex_count: 8320,
            anim_fps: crate::ANIM_FPS,
            mood_dim: 16,
            smooth_mood_init: false,
            mood_filter_window: 129,
            batch_size: 1024,
            workers: 8,
            epochs: 50_000,
            learning_rate: 1e-3,
            checkpoint_every: 50,
            jitter: true,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Default configuration for a named clip
    pub fn for_clip(clip: impl Into<String>) -> Self {
        Self {
            clip: clip.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save the configuration to a YAML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_yaml::to_string(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check the fields every pipeline stage relies on. Preview only
    /// needs these, training validates the rest on top.
    pub fn validate_model(&self) -> Result<()> {
        if self.vertex_count == 0 {
            anyhow::bail!("vertex_count must be positive");
        }
        if self.mood_dim == 0 {
            anyhow::bail!("mood_dim must be positive");
        }
        if !(self.anim_fps.is_finite() && self.anim_fps > 0.0) {
            anyhow::bail!("anim_fps must be positive, got {}", self.anim_fps);
        }
        Ok(())
    }

    /// Check that all fields are usable before a training run
    pub fn validate(&self) -> Result<()> {
        self.validate_model()?;
        if self.clip.is_empty() {
            anyhow::bail!("clip name must not be empty");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be positive");
        }
        if self.epochs == 0 {
            anyhow::bail!("epochs must be positive");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            anyhow::bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.checkpoint_every == 0 {
            anyhow::bail!("checkpoint_every must be positive");
        }
        if self.mood_filter_window < 5 || self.mood_filter_window % 2 == 0 {
            anyhow::bail!(
                "mood_filter_window must be odd and at least 5, got {}",
                self.mood_filter_window
            );
        }
        Ok(())
    }

    /// Vertex-offset vector length per frame (x/y/z per vertex)
    pub fn vertex_dim(&self) -> usize {
        self.vertex_count * 3
    }

    /// Directory holding the clip's audio and targets
    pub fn clip_dir(&self) -> PathBuf {
        self.root_path.join("data").join(&self.clip)
    }

    /// Path of the clip's WAV file
    pub fn audio_path(&self) -> PathBuf {
        self.clip_dir().join(format!("{}.wav", self.clip))
    }

    /// Directory holding the clip's per-frame target files
    pub fn target_dir(&self) -> PathBuf {
        self.clip_dir().join("maskSeq")
    }

    /// Directory receiving per-run scalar logs
    pub fn logs_dir(&self) -> PathBuf {
        self.root_path.join("logs")
    }

    /// Directory receiving per-run checkpoints
    pub fn model_dir(&self) -> PathBuf {
        self.root_path.join("model")
    }
}
