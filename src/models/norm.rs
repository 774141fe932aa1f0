//! Channel batch normalization over `(n, c, l)` activations
//!
//! Training mode normalizes with batch statistics and tracks running
//! mean/variance; eval mode normalizes with the tracked values. The
//! running statistics are var-map entries (resolved through
//! [`super::varmap_var`]) so checkpoints carry the trained values.

use candle_core::{Result, Tensor, Var};
use candle_nn::{Init, VarBuilder, VarMap};

/// Eps used everywhere the reference architecture does not override it
pub(crate) const DEFAULT_EPS: f64 = 1e-5;

const MOMENTUM: f64 = 0.1;

pub(crate) struct ChannelNorm {
    weight: Tensor,
    bias: Tensor,
    running_mean: Var,
    running_var: Var,
    eps: f64,
}

impl ChannelNorm {
    pub(crate) fn new(
        channels: usize,
        eps: f64,
        varmap: &VarMap,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight = vb.get_with_hints(channels, "weight", Init::Const(1.))?;
        let bias = vb.get_with_hints(channels, "bias", Init::Const(0.))?;
        let running_mean =
            super::varmap_var(varmap, &vb.get_with_hints(channels, "running_mean", Init::Const(0.))?)?;
        let running_var =
            super::varmap_var(varmap, &vb.get_with_hints(channels, "running_var", Init::Const(1.))?)?;
        Ok(Self {
            weight,
            bias,
            running_mean,
            running_var,
            eps,
        })
    }

    pub(crate) fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (n, c, l) = x.dims3()?;
        if c != self.weight.dim(0)? {
            candle_core::bail!(
                "channel norm built for {} channels, got {}",
                self.weight.dim(0)?,
                c
            );
        }

        if train {
            let flat = x.transpose(0, 1)?.reshape((c, n * l))?;
            let mean = flat.mean_keepdim(1)?;
            let centered = flat.broadcast_sub(&mean)?;
            let var = centered.sqr()?.mean_keepdim(1)?;
            let denom = (var.clone() + self.eps)?.sqrt()?;
            let out = centered
                .broadcast_div(&denom)?
                .reshape((c, n, l))?
                .transpose(0, 1)?
                .broadcast_mul(&self.weight.reshape((1, c, 1))?)?
                .broadcast_add(&self.bias.reshape((1, c, 1))?)?;

            let count = (n * l) as f64;
            let bias_correction = if count > 1.0 { count / (count - 1.0) } else { 1.0 };
            let batch_mean = mean.flatten_all()?.detach();
            let batch_var = (var.flatten_all()?.detach() * bias_correction)?;
            let new_mean = ((self.running_mean.as_tensor() * (1.0 - MOMENTUM))?
                + (batch_mean * MOMENTUM)?)?;
            let new_var =
                ((self.running_var.as_tensor() * (1.0 - MOMENTUM))? + (batch_var * MOMENTUM)?)?;
            self.running_mean.set(&new_mean)?;
            self.running_var.set(&new_var)?;

            Ok(out)
        } else {
            let mean = self.running_mean.as_tensor().reshape((1, c, 1))?;
            let var = self.running_var.as_tensor().reshape((1, c, 1))?;
            let denom = (var + self.eps)?.sqrt()?;
            x.broadcast_sub(&mean)?
                .broadcast_div(&denom)?
                .broadcast_mul(&self.weight.reshape((1, c, 1))?)?
                .broadcast_add(&self.bias.reshape((1, c, 1))?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarBuilder;

    fn build(channels: usize) -> (VarMap, ChannelNorm) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let norm = ChannelNorm::new(channels, DEFAULT_EPS, &varmap, vb.pp("norm")).unwrap();
        (varmap, norm)
    }

    fn channel_stats(x: &Tensor) -> (Vec<f32>, Vec<f32>) {
        let (n, c, l) = x.dims3().unwrap();
        let rows = x
            .transpose(0, 1)
            .unwrap()
            .reshape((c, n * l))
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        let means: Vec<f32> = rows
            .iter()
            .map(|r| r.iter().sum::<f32>() / r.len() as f32)
            .collect();
        let vars: Vec<f32> = rows
            .iter()
            .zip(&means)
            .map(|(r, m)| r.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / r.len() as f32)
            .collect();
        (means, vars)
    }

    #[test]
    fn test_train_normalizes_per_channel() {
        let (_varmap, norm) = build(3);
        let data: Vec<f32> = (0..24).map(|i| i as f32 * 1.7 - 5.0).collect();
        let x = Tensor::from_vec(data, (2, 3, 4), &Device::Cpu).unwrap();
        let out = norm.forward_t(&x, true).unwrap();
        assert_eq!(out.dims(), &[2, 3, 4]);

        let (means, vars) = channel_stats(&out);
        for m in means {
            assert!(m.abs() < 1e-4, "channel mean {m}");
        }
        for v in vars {
            assert!((v - 1.0).abs() < 1e-2, "channel variance {v}");
        }
    }

    #[test]
    fn test_eval_is_identity_at_init() {
        let (_varmap, norm) = build(2);
        let data: Vec<f32> = (0..16).map(|i| (i as f32).sin()).collect();
        let x = Tensor::from_vec(data.clone(), (2, 2, 4), &Device::Cpu).unwrap();
        let out = norm.forward_t(&x, false).unwrap();
        let flat = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for (o, i) in flat.iter().zip(&data) {
            assert!((o - i).abs() < 1e-4);
        }
    }

    #[test]
    fn test_running_stats_reach_saved_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("norm.safetensors");
        let (varmap, norm) = build(2);

        let data: Vec<f32> = (0..16).map(|i| i as f32 + 3.0).collect();
        let x = Tensor::from_vec(data, (2, 2, 4), &Device::Cpu).unwrap();
        norm.forward_t(&x, true).unwrap();
        varmap.save(&path).unwrap();

        let loaded = candle_core::safetensors::load(&path, &Device::Cpu).unwrap();
        let mean = loaded
            .get("norm.running_mean")
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert!(mean.iter().any(|m| m.abs() > 1e-3), "running mean {mean:?}");
    }
}
