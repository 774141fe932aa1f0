//! Full speech-to-vertex network
//!
//! Composes the formant encoder, the learned mood table and the
//! articulation decoder. The mood vector for each window is tiled
//! across the latent time axis and concatenated channel-wise before
//! decoding, so emotional state conditions every articulation stage.

use candle_core::{Result, Tensor};
use candle_nn::{VarBuilder, VarMap};

use super::articulation::ArticulationDecoder;
use super::formant::{FormantEncoder, LATENT_CHANNELS};
use super::mood::{Conditioning, MoodTable};

/// Speech windows in, vertex offsets out.
pub struct VertexRegressor {
    formant: FormantEncoder,
    mood: MoodTable,
    articulation: ArticulationDecoder,
    vertex_dim: usize,
}

impl VertexRegressor {
    /// Builds the network for `mood_rows` animation frames and
    /// `vertex_dim` output components.
    pub fn new(
        mood_rows: usize,
        mood_dim: usize,
        vertex_dim: usize,
        varmap: &VarMap,
        vb: VarBuilder,
    ) -> Result<Self> {
        let formant = FormantEncoder::new(varmap, vb.pp("formant"))?;
        let mood = MoodTable::new(mood_rows, mood_dim, varmap, vb.pp("mood"))?;
        let articulation = ArticulationDecoder::new(
            LATENT_CHANNELS + mood_dim,
            vertex_dim,
            varmap,
            vb.pp("articulation"),
        )?;
        Ok(Self {
            formant,
            mood,
            articulation,
            vertex_dim,
        })
    }

    /// The learned mood table.
    pub fn mood(&self) -> &MoodTable {
        &self.mood
    }

    /// Output components per frame.
    pub fn vertex_dim(&self) -> usize {
        self.vertex_dim
    }

    /// Predicts `(n, vertex_dim)` offsets for `(n, 1, rows, 32)` windows.
    pub fn forward_t(
        &self,
        windows: &Tensor,
        conditioning: &Conditioning,
        train: bool,
    ) -> Result<Tensor> {
        let (n, _channels, rows, _width) = windows.dims4()?;
        let latent = self.formant.forward_t(windows, train)?;
        let moods = self.mood.resolve(conditioning, n)?;
        let mood_planes = moods.unsqueeze(2)?.repeat((1, 1, rows))?;
        let conditioned = Tensor::cat(&[&latent, &mood_planes], 1)?;
        self.articulation.forward_t(&conditioned, train)
    }
}
