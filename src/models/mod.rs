//! Model components
//!
//! The regressor is an explicit composition of three parts:
//!
//! - [`FormantEncoder`]: per-time-row convolutions collapsing the 32-wide
//!   cepstral axis into a 256-channel latent
//! - [`MoodTable`]: learned per-animation-frame embedding, concatenated
//!   onto the latent channels
//! - [`ArticulationDecoder`]: temporal convolutions collapsing the 64-row
//!   context, followed by the linear output head

mod articulation;
mod formant;
mod mood;
mod norm;
mod regressor;

pub use articulation::ArticulationDecoder;
pub use formant::{FormantEncoder, INPUT_WIDTH, LATENT_CHANNELS};
pub use mood::{initial_table, Conditioning, MoodTable};
pub use regressor::VertexRegressor;

use candle_core::{Result, Tensor, Var};
use candle_nn::VarMap;

/// Resolve the var map entry backing `tensor`.
///
/// Layers built through a `VarBuilder` receive tensors that share storage
/// with the map's vars; matching by tensor id recovers the var handle
/// without depending on path names.
pub(crate) fn varmap_var(varmap: &VarMap, tensor: &Tensor) -> Result<Var> {
    let data = varmap.data().lock().unwrap();
    for var in data.values() {
        if var.as_tensor().id() == tensor.id() {
            return Ok(var.clone());
        }
    }
    candle_core::bail!("tensor is not registered in the var map")
}
