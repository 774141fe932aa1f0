//! Articulation decoder and vertex output head
//!
//! Collapses the 64 latent columns of an analysis window down the time
//! axis into a single activation, then maps it to vertex offsets
//! through a two-layer head with a tanh output. The convolution stages
//! keep the channel width fixed and halve the time axis, with the last
//! stage folding the remaining four columns at once.

use candle_core::{DType, Result, Tensor};
use candle_nn::{conv1d, linear, ops::leaky_relu, Conv1d, Conv1dConfig, Linear, Module, VarBuilder, VarMap};

use super::norm::ChannelNorm;

const TIME_STEPS: usize = 64;
const NORM_EPS: f64 = 0.8;
const LEAKY_SLOPE: f64 = 0.01;
const DROPOUT_P: f32 = 0.2;
const HIDDEN_DIM: usize = 128;

struct DecoderBlock {
    conv: Conv1d,
    norm: ChannelNorm,
}

impl DecoderBlock {
    fn new(
        channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        varmap: &VarMap,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv1dConfig {
            padding,
            stride,
            ..Default::default()
        };
        let conv = conv1d(channels, channels, kernel, cfg, vb.pp("conv"))?;
        let norm = ChannelNorm::new(channels, NORM_EPS, varmap, vb.pp("norm"))?;
        Ok(Self { conv, norm })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv.forward(x)?;
        let x = self.norm.forward_t(&x, train)?;
        let x = leaky_relu(&x, LEAKY_SLOPE)?;
        channel_dropout(&x, DROPOUT_P, train)
    }
}

/// Zeroes whole channels, scaling the survivors to keep expectations.
fn channel_dropout(x: &Tensor, p: f32, train: bool) -> Result<Tensor> {
    if !train || p == 0.0 {
        return Ok(x.clone());
    }
    let (n, c, _l) = x.dims3()?;
    let keep = Tensor::rand(0f32, 1f32, (n, c, 1), x.device())?
        .ge(p)?
        .to_dtype(DType::F32)?
        .affine(1.0 / (1.0 - p as f64), 0.0)?;
    x.broadcast_mul(&keep)
}

/// Time-collapsing convolution stack plus the vertex offset head.
pub struct ArticulationDecoder {
    blocks: Vec<DecoderBlock>,
    hidden: Linear,
    output: Linear,
    in_channels: usize,
}

impl ArticulationDecoder {
    /// Builds the decoder for `in_channels` conditioned latent channels.
    pub fn new(
        in_channels: usize,
        vertex_dim: usize,
        varmap: &VarMap,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut blocks = Vec::with_capacity(5);
        for i in 0..4 {
            blocks.push(DecoderBlock::new(
                in_channels,
                3,
                2,
                1,
                varmap,
                vb.pp(format!("block{i}")),
            )?);
        }
        blocks.push(DecoderBlock::new(
            in_channels,
            4,
            4,
            1,
            varmap,
            vb.pp("block4"),
        )?);
        let hidden = linear(in_channels, HIDDEN_DIM, vb.pp("hidden"))?;
        let output = linear(HIDDEN_DIM, vertex_dim, vb.pp("output"))?;
        Ok(Self {
            blocks,
            hidden,
            output,
            in_channels,
        })
    }

    /// Maps `(n, channels, 64)` conditioned latents to `(n, vertex_dim)`
    /// offsets in `[-1, 1]`.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_n, c, l) = x.dims3()?;
        if c != self.in_channels {
            candle_core::bail!("decoder built for {} channels, got {c}", self.in_channels);
        }
        if l != TIME_STEPS {
            candle_core::bail!("expected {TIME_STEPS} latent columns, got {l}");
        }

        let mut x = x.clone();
        for block in &self.blocks {
            x = block.forward_t(&x, train)?;
        }
        let x = x.squeeze(2)?;
        let x = self.hidden.forward(&x)?;
        self.output.forward(&x)?.tanh()
    }
}
