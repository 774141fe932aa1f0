//! Audio processing modules
//!
//! - WAV loading with channel selection and DC removal
//! - Sample rate conversion to the pipeline rate (16 kHz)
//! - Kaldi-style MFCC feature extraction (64 mel bins, 32 cepstra)

mod loader;
mod mfcc;
mod resampler;

pub use loader::{AudioLoader, Waveform};
pub use mfcc::{FeatureSequence, MfccConfig, MfccExtractor};
pub use resampler::Resampler;
