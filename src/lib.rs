//! # SpeechFace - Speech-Driven Facial Animation
//!
//! Trains a model that maps short windows of speech audio to per-frame 3D
//! facial-mesh vertex offsets, conditioned on a learned per-frame "mood"
//! embedding.
//!
//! ## Features
//!
//! - Kaldi-style MFCC feature extraction with temporal alignment to the
//!   animation frame rate
//! - Paired-frame sampling with jitter augmentation and circular boundary
//!   handling
//! - Convolutional formant encoder + mood-conditioned articulation decoder
//! - Composite shape/motion/emotion loss with Adam optimization
//! - Periodic safetensors checkpoints and per-epoch scalar logs
//! - Target-less preview mode over arbitrary audio
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use speechface::{PipelineConfig, Trainer};
//! use candle_core::Device;
//!
//! let config = PipelineConfig::for_clip("session01");
//! let mut trainer = Trainer::new(config, Device::Cpu)?;
//! let outcome = trainer.train()?;
//! println!("final checkpoint: {}", outcome.final_checkpoint.display());
//! ```

// Allow dead code for infrastructure that may be used in the future
#![allow(dead_code)]
// Require docs for public items, but not struct fields (too verbose)
#![warn(missing_docs)]
#![allow(rustdoc::missing_crate_level_docs)]

pub mod audio;
pub mod config;
pub mod data;
pub mod inference;
pub mod models;
pub mod training;
pub mod utils;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use inference::{MoodSource, PreviewPipeline};
pub use models::{Conditioning, VertexRegressor};
pub use training::{TrainOutcome, Trainer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sample rate all audio is resampled to before feature extraction (16 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Animation frame rate the pipeline aligns against (NTSC video rate)
pub const ANIM_FPS: f64 = 29.97;
