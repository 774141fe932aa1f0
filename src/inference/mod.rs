//! Inference over trained checkpoints
//!
//! This module provides the preview entry point:
//! - PreviewPipeline: per-frame vertex offsets for a whole clip
//! - MoodSource: emotional conditioning choices at preview time

mod preview;

pub use preview::{MoodSource, PreviewPipeline};
