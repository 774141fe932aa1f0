//! Formant analysis encoder
//!
//! Condenses each 32-coefficient cepstral row into a 256-channel latent
//! vector. Every time row of the input window runs through the same
//! five-stage convolution stack, so the rows are folded into the batch
//! dimension and restored afterwards. The output keeps one latent
//! column per input row.

use candle_core::{Result, Tensor};
use candle_nn::{conv1d, ops::leaky_relu, Conv1d, Conv1dConfig, Module, VarBuilder, VarMap};

use super::norm::{ChannelNorm, DEFAULT_EPS};

/// Channels produced for each analysed time row
pub const LATENT_CHANNELS: usize = 256;

/// Cepstral coefficients expected per time row
pub const INPUT_WIDTH: usize = 32;

const STAGE_CHANNELS: [usize; 6] = [1, 72, 108, 162, 243, LATENT_CHANNELS];
const LEAKY_SLOPE: f64 = 0.01;

struct EncoderBlock {
    conv: Conv1d,
    norm: ChannelNorm,
}

impl EncoderBlock {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        padding: usize,
        varmap: &VarMap,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv1dConfig {
            padding,
            stride: 2,
            ..Default::default()
        };
        let conv = conv1d(in_channels, out_channels, kernel, cfg, vb.pp("conv"))?;
        let norm = ChannelNorm::new(out_channels, DEFAULT_EPS, varmap, vb.pp("norm"))?;
        Ok(Self { conv, norm })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv.forward(x)?;
        let x = self.norm.forward_t(&x, train)?;
        leaky_relu(&x, LEAKY_SLOPE)
    }
}

/// Shared per-row convolution stack, 32 coefficients down to one latent column
pub struct FormantEncoder {
    blocks: Vec<EncoderBlock>,
}

impl FormantEncoder {
    /// Builds the five-stage encoder under `vb`.
    pub fn new(varmap: &VarMap, vb: VarBuilder) -> Result<Self> {
        let mut blocks = Vec::with_capacity(STAGE_CHANNELS.len() - 1);
        for (i, pair) in STAGE_CHANNELS.windows(2).enumerate() {
            let last = i == STAGE_CHANNELS.len() - 2;
            let (kernel, padding) = if last { (2, 0) } else { (3, 1) };
            blocks.push(EncoderBlock::new(
                pair[0],
                pair[1],
                kernel,
                padding,
                varmap,
                vb.pp(format!("block{i}")),
            )?);
        }
        Ok(Self { blocks })
    }

    /// Maps `(n, 1, rows, 32)` windows to `(n, 256, rows)` latents.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (n, channels, rows, width) = x.dims4()?;
        if channels != 1 {
            candle_core::bail!("expected single-channel feature windows, got {channels} channels");
        }
        if width != INPUT_WIDTH {
            candle_core::bail!("expected {INPUT_WIDTH} coefficients per row, got {width}");
        }

        // Fold the time rows into the batch so each row shares the stack.
        let mut x = x
            .permute((0, 2, 1, 3))?
            .reshape((n * rows, 1, width))?;
        for block in &self.blocks {
            x = block.forward_t(&x, train)?;
        }
        x.reshape((n, rows, LATENT_CHANNELS))?
            .transpose(1, 2)?
            .contiguous()
    }
}
