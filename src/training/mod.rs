//! Training pipeline
//!
//! Composite loss over paired frames, scalar logging, checkpoint
//! management and the epoch loop that ties them together.

pub mod checkpoint;
pub mod losses;
pub mod metrics;
pub mod trainer;

pub use checkpoint::{mood_rows_in, run_stamp, CheckpointWriter};
pub use losses::{composite, LossBreakdown};
pub use metrics::ScalarLogger;
pub use trainer::{TrainOutcome, Trainer};
