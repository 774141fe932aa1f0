//! Checkpoint naming and persistence
//!
//! Each training run gets a timestamp identifier and its own directory
//! under the model root. Periodic snapshots are numbered by epoch and
//! the closing snapshot carries a `_fin` suffix, so interrupted and
//! completed runs are distinguishable at a glance.

use anyhow::{Context, Result};
use candle_core::Device;
use candle_nn::VarMap;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Name of the mood table tensor inside a checkpoint.
pub const MOOD_TENSOR: &str = "mood.weight";

/// Timestamp identifier for a new training run.
pub fn run_stamp() -> String {
    Local::now().format("%y_%m_%d_%H_%M_%S").to_string()
}

/// Writes a run's numbered and final checkpoints.
pub struct CheckpointWriter {
    dir: PathBuf,
    run: String,
}

impl CheckpointWriter {
    /// Creates `model_root/<run>/` and a writer for it.
    pub fn create(model_root: &Path, run: &str) -> Result<Self> {
        let dir = model_root.join(run);
        std::fs::create_dir_all(&dir).with_context(|| {
            format!("failed to create checkpoint directory: {}", dir.display())
        })?;
        Ok(Self {
            dir,
            run: run.to_string(),
        })
    }

    /// Path of the numbered snapshot for `epoch`.
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{}_E{epoch:05}.safetensors", self.run))
    }

    /// Path of the closing snapshot.
    pub fn final_path(&self) -> PathBuf {
        self.dir.join(format!("{}_fin.safetensors", self.run))
    }

    /// Saves a numbered snapshot of the var map.
    pub fn save_epoch(&self, varmap: &VarMap, epoch: usize) -> Result<PathBuf> {
        let path = self.epoch_path(epoch);
        varmap
            .save(&path)
            .with_context(|| format!("failed to write checkpoint: {}", path.display()))?;
        Ok(path)
    }

    /// Saves the closing snapshot of the var map.
    pub fn save_final(&self, varmap: &VarMap) -> Result<PathBuf> {
        let path = self.final_path();
        varmap
            .save(&path)
            .with_context(|| format!("failed to write checkpoint: {}", path.display()))?;
        Ok(path)
    }
}

/// Reads the mood table row count out of a saved checkpoint. The row
/// count fixes how many animation frames the training clip had, which a
/// fresh model must match before the weights can be loaded back.
pub fn mood_rows_in(path: &Path, device: &Device) -> Result<usize> {
    let tensors = candle_core::safetensors::load(path, device)
        .with_context(|| format!("failed to read checkpoint: {}", path.display()))?;
    let mood = tensors
        .get(MOOD_TENSOR)
        .with_context(|| format!("checkpoint has no mood table: {}", path.display()))?;
    let (rows, _dim) = mood
        .dims2()
        .with_context(|| format!("mood table is not a matrix: {}", path.display()))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;

    #[test]
    fn test_run_stamp_shape() {
        let stamp = run_stamp();
        assert_eq!(stamp.len(), 17);
        for i in [2, 5, 8, 11, 14] {
            assert_eq!(&stamp[i..i + 1], "_");
        }
    }

    #[test]
    fn test_checkpoint_paths() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::create(dir.path(), "24_01_02_03_04_05").unwrap();
        assert!(dir.path().join("24_01_02_03_04_05").is_dir());
        assert_eq!(
            writer.epoch_path(50).file_name().unwrap(),
            "24_01_02_03_04_05_E00050.safetensors"
        );
        assert_eq!(
            writer.final_path().file_name().unwrap(),
            "24_01_02_03_04_05_fin.safetensors"
        );
    }

    #[test]
    fn test_saved_mood_rows_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::create(dir.path(), "run").unwrap();

        let varmap = VarMap::new();
        varmap
            .get((5, 3), MOOD_TENSOR, Init::Const(0.), DType::F32, &Device::Cpu)
            .unwrap();
        let path = writer.save_epoch(&varmap, 50).unwrap();
        assert!(path.exists());
        assert_eq!(mood_rows_in(&path, &Device::Cpu).unwrap(), 5);
    }

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.safetensors");
        let err = mood_rows_in(&missing, &Device::Cpu).unwrap_err();
        assert!(format!("{err:#}").contains("nope.safetensors"));
    }
}
