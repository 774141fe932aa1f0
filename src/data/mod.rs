//! Dataset handling
//!
//! - `.npy` reading/writing for per-frame vertex-offset arrays
//! - Target loading with the 1-indexed on-disk naming
//! - Temporal alignment and paired-frame sampling
//! - Parallel batch preparation

mod batcher;
mod dataset;
mod npy;
mod targets;

pub use batcher::{BatchLoader, HostBatch};
pub use dataset::{frame_count, FrameSampler, Sample, SampleMode, WINDOW_ROWS};
pub use npy::{load_npy, load_npy_f32, write_npy_f32, NpyArray};
pub use targets::TargetStore;
