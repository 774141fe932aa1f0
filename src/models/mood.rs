//! Learned per-frame emotional state
//!
//! Each animation frame of the training clip owns a trainable mood
//! vector. During training the rows are looked up by frame id so the
//! vectors co-train with the network; at inference time a caller can
//! either reuse a learned row or supply an explicit vector.

use candle_core::{Device, Result, Tensor, Var};
use candle_nn::{Embedding, Module, VarBuilder, VarMap};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// How a batch of windows is conditioned on emotional state.
pub enum Conditioning {
    /// Frame ids into the learned mood table, one `u32` id per window.
    ByIndex(Tensor),
    /// Explicit mood vectors, `(n, dim)` or `(1, dim)` broadcast to the batch.
    ByVector(Tensor),
}

/// Trainable `(frames, dim)` mood matrix with row lookup.
pub struct MoodTable {
    table: Embedding,
    var: Var,
    rows: usize,
    dim: usize,
}

impl MoodTable {
    /// Builds a trainable table with one `dim`-component row per frame.
    pub fn new(rows: usize, dim: usize, varmap: &VarMap, vb: VarBuilder) -> Result<Self> {
        let table = candle_nn::embedding(rows, dim, vb)?;
        let var = super::varmap_var(varmap, table.embeddings())?;
        Ok(Self {
            table,
            var,
            rows,
            dim,
        })
    }

    /// Number of frame rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Components per mood vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Looks up mood rows for a `(n,)` tensor of `u32` frame ids.
    pub fn rows_for(&self, ids: &Tensor) -> Result<Tensor> {
        self.table.forward(ids)
    }

    /// Turns a conditioning request into `(batch, dim)` mood vectors.
    pub fn resolve(&self, conditioning: &Conditioning, batch: usize) -> Result<Tensor> {
        match conditioning {
            Conditioning::ByIndex(ids) => {
                let n = ids.dims1()?;
                if n != batch {
                    candle_core::bail!("got {n} frame ids for a batch of {batch} windows");
                }
                self.rows_for(ids)
            }
            Conditioning::ByVector(vectors) => {
                let (n, dim) = vectors.dims2()?;
                if dim != self.dim {
                    candle_core::bail!(
                        "mood vectors have {dim} components, table stores {}",
                        self.dim
                    );
                }
                if n == batch {
                    Ok(vectors.clone())
                } else if n == 1 {
                    vectors.repeat((batch, 1))
                } else {
                    candle_core::bail!("got {n} mood vectors for a batch of {batch} windows");
                }
            }
        }
    }

    /// Overwrites the whole table, keeping the trainable var in place.
    pub fn set_rows(&self, values: &Tensor) -> Result<()> {
        let (rows, dim) = values.dims2()?;
        if rows != self.rows || dim != self.dim {
            candle_core::bail!(
                "mood table is ({}, {}), got ({rows}, {dim})",
                self.rows,
                self.dim
            );
        }
        self.var.set(values)
    }
}

/// Builds the standard-normal initial mood table, optionally smoothed
/// down each component so neighbouring frames start from similar moods.
pub fn initial_table(
    rows: usize,
    dim: usize,
    smooth: bool,
    window: usize,
    seed: u64,
    device: &Device,
) -> Result<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    let count = rows * dim;
    let mut values = Vec::with_capacity(count);
    while values.len() < count {
        // Box-Muller keeps the draw reproducible on every backend.
        let u1: f64 = rng.gen::<f64>().max(1e-12);
        let u2: f64 = rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f64::consts::PI * u2;
        values.push((radius * angle.cos()) as f32);
        if values.len() < count {
            values.push((radius * angle.sin()) as f32);
        }
    }
    if smooth {
        values = crate::utils::filters::smooth_columns(&values, rows, dim, window);
    }
    Tensor::from_vec(values, (rows, dim), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarBuilder;

    fn build(rows: usize, dim: usize) -> (VarMap, MoodTable) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let table = MoodTable::new(rows, dim, &varmap, vb.pp("mood")).unwrap();
        (varmap, table)
    }

    fn fill(table: &MoodTable, rows: usize, dim: usize) {
        let values: Vec<f32> = (0..rows * dim)
            .map(|i| (i / dim) as f32 + (i % dim) as f32 * 0.5)
            .collect();
        let values = Tensor::from_vec(values, (rows, dim), &Device::Cpu).unwrap();
        table.set_rows(&values).unwrap();
    }

    #[test]
    fn test_by_index_returns_rows_for_frame_ids() {
        let (_varmap, table) = build(6, 3);
        fill(&table, 6, 3);

        let ids = Tensor::new(&[3u32, 4], &Device::Cpu).unwrap();
        let moods = table
            .resolve(&Conditioning::ByIndex(ids), 2)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(moods[0], vec![3.0, 3.5, 4.0]);
        assert_eq!(moods[1], vec![4.0, 4.5, 5.0]);
    }

    #[test]
    fn test_by_vector_broadcasts_single_row() {
        let (_varmap, table) = build(4, 3);
        let v = Tensor::new(&[[0.25f32, -0.5, 1.0]], &Device::Cpu).unwrap();
        let moods = table
            .resolve(&Conditioning::ByVector(v), 3)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(moods.len(), 3);
        for row in moods {
            assert_eq!(row, vec![0.25, -0.5, 1.0]);
        }
    }

    #[test]
    fn test_by_vector_passes_exact_batch_through() {
        let (_varmap, table) = build(4, 2);
        let v = Tensor::new(&[[1f32, 2.], [3., 4.]], &Device::Cpu).unwrap();
        let moods = table
            .resolve(&Conditioning::ByVector(v), 2)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(moods, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let (_varmap, table) = build(4, 3);

        let wrong_dim = Tensor::zeros((1, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(table.resolve(&Conditioning::ByVector(wrong_dim), 2).is_err());

        let wrong_count = Tensor::zeros((3, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(table
            .resolve(&Conditioning::ByVector(wrong_count), 2)
            .is_err());

        let ids = Tensor::new(&[0u32, 1, 2], &Device::Cpu).unwrap();
        assert!(table.resolve(&Conditioning::ByIndex(ids), 2).is_err());

        let wrong_shape = Tensor::zeros((5, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(table.set_rows(&wrong_shape).is_err());
    }

    #[test]
    fn test_initial_table_is_seed_deterministic() {
        let a = initial_table(10, 4, false, 129, 7, &Device::Cpu).unwrap();
        let b = initial_table(10, 4, false, 129, 7, &Device::Cpu).unwrap();
        let c = initial_table(10, 4, false, 129, 8, &Device::Cpu).unwrap();
        assert_eq!(
            a.to_vec2::<f32>().unwrap(),
            b.to_vec2::<f32>().unwrap()
        );
        assert_ne!(
            a.to_vec2::<f32>().unwrap(),
            c.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_smoothing_reduces_column_variance() {
        let raw = initial_table(200, 4, false, 129, 11, &Device::Cpu).unwrap();
        let smooth = initial_table(200, 4, true, 129, 11, &Device::Cpu).unwrap();

        let variance = |t: &Tensor| {
            let flat = t.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            let mean = flat.iter().sum::<f32>() / flat.len() as f32;
            flat.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / flat.len() as f32
        };
        assert!(variance(&smooth) < variance(&raw) * 0.5);
    }
}
