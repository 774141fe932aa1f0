//! Per-frame vertex-offset targets
//!
//! Targets live as one `.npy` file per animation frame under the clip's
//! `maskSeq/` directory, named `mask.{:05}.npy` with 1-based numbering.
//! Raw offsets span `[-2, 2]`; loading halves them into the network's
//! `[-1, 1]` output range.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::npy;

/// Loader for a clip's target directory
#[derive(Debug, Clone)]
pub struct TargetStore {
    dir: PathBuf,
    vertex_dim: usize,
}

impl TargetStore {
    /// Create a store over a target directory
    pub fn new(dir: impl Into<PathBuf>, vertex_dim: usize) -> Self {
        Self {
            dir: dir.into(),
            vertex_dim,
        }
    }

    /// Vertex-offset vector length per frame
    pub fn vertex_dim(&self) -> usize {
        self.vertex_dim
    }

    /// Path of the on-disk file for 1-based frame number `file_no`
    pub fn frame_path(&self, file_no: usize) -> PathBuf {
        self.dir.join(format!("mask.{:05}.npy", file_no))
    }

    /// Load the scaled target pair for sampler index `index`.
    ///
    /// Sampler indices are 0-based while the on-disk files are 1-based, so
    /// index `i` reads files `i + 1` and `i + 2`. The result is the two
    /// frames concatenated, `2 * vertex_dim` values in `[-1, 1]`.
    pub fn load_pair(&self, index: usize) -> Result<Vec<f32>> {
        let mut pair = Vec::with_capacity(2 * self.vertex_dim);
        pair.extend(self.load_frame(index + 1)?);
        pair.extend(self.load_frame(index + 2)?);
        for v in pair.iter_mut() {
            *v *= 0.5;
        }
        Ok(pair)
    }

    fn load_frame(&self, file_no: usize) -> Result<Vec<f32>> {
        let path = self.frame_path(file_no);
        let (data, _shape) = npy::load_npy_f32(&path)
            .with_context(|| format!("target loading failed for {}", path.display()))?;
        if data.len() != self.vertex_dim {
            anyhow::bail!(
                "target {} holds {} values, expected {}",
                path.display(),
                data.len(),
                self.vertex_dim
            );
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::npy::write_npy_f32;
    use std::path::Path;

    fn write_frame(dir: &Path, file_no: usize, values: &[f32]) {
        let path = dir.join(format!("mask.{:05}.npy", file_no));
        write_npy_f32(path, values, &[values.len()]).unwrap();
    }

    #[test]
    fn test_pair_uses_one_based_files() {
        let dir = tempfile::tempdir().unwrap();
        let five = [1.0f32, 2.0, -1.0, 0.5, 2.0, -2.0];
        let six = [0.0f32, -0.5, 1.5, 2.0, -1.0, 1.0];
        write_frame(dir.path(), 5, &five);
        write_frame(dir.path(), 6, &six);

        let store = TargetStore::new(dir.path(), 6);
        let pair = store.load_pair(4).unwrap();
        assert_eq!(pair.len(), 12);
        for (got, raw) in pair[..6].iter().zip(&five) {
            assert_eq!(*got, raw * 0.5);
        }
        for (got, raw) in pair[6..].iter().zip(&six) {
            assert_eq!(*got, raw * 0.5);
        }
    }

    #[test]
    fn test_scaling_lands_in_unit_range() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 1, &[-2.0, 2.0, 0.0]);
        write_frame(dir.path(), 2, &[2.0, -2.0, 1.0]);

        let store = TargetStore::new(dir.path(), 3);
        let pair = store.load_pair(0).unwrap();
        assert!(pair.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(pair[0], -1.0);
        assert_eq!(pair[3], 1.0);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = TargetStore::new(dir.path(), 3);
        let err = store.load_pair(0).unwrap_err();
        assert!(format!("{err:#}").contains("mask.00001.npy"));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 1, &[1.0, 2.0]);
        write_frame(dir.path(), 2, &[1.0, 2.0]);
        let store = TargetStore::new(dir.path(), 3);
        assert!(store.load_pair(0).is_err());
    }
}
