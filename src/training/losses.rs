//! Composite training loss
//!
//! Three terms share one reduction: squared error summed over the last
//! axis, then averaged over the batch. The shape term anchors the first
//! frame of each pair to its target, the motion term matches the
//! frame-to-frame delta, and the emotion term pulls consecutive mood
//! vectors together so the learned emotional state drifts slowly.

use candle_core::{Result, Tensor, D};

/// Per-term loss values read back from the device.
#[derive(Debug, Clone, Copy)]
pub struct LossBreakdown {
    /// First-frame vertex position error
    pub shape: f32,
    /// Frame-to-frame motion error
    pub motion: f32,
    /// Consecutive-mood smoothness penalty
    pub emotion: f32,
}

impl LossBreakdown {
    /// Sum of the three terms, the value the optimizer steps on.
    pub fn total(&self) -> f32 {
        self.shape + self.motion + self.emotion
    }

    /// True while no term has gone NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.shape.is_finite() && self.motion.is_finite() && self.emotion.is_finite()
    }
}

/// Squared error summed over the last axis, averaged over the rest.
pub(crate) fn sum_squared_error(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    (a - b)?.sqr()?.sum(D::Minus1)?.mean_all()
}

/// Combines shape, motion and emotion terms for a batch of frame pairs.
///
/// `predictions` and `targets` are `(batch, 2, vertex_dim)`, moods are
/// `(batch, mood_dim)` rows for each pair's first and second frame.
pub fn composite(
    predictions: &Tensor,
    targets: &Tensor,
    mood_now: &Tensor,
    mood_next: &Tensor,
) -> Result<(Tensor, LossBreakdown)> {
    let (_batch, pair, _dim) = predictions.dims3()?;
    if pair != 2 {
        candle_core::bail!("expected frame pairs, got {pair} frames per example");
    }
    if predictions.dims() != targets.dims() {
        candle_core::bail!(
            "prediction shape {:?} does not match target shape {:?}",
            predictions.dims(),
            targets.dims()
        );
    }

    let pred_now = predictions.narrow(1, 0, 1)?.squeeze(1)?;
    let pred_next = predictions.narrow(1, 1, 1)?.squeeze(1)?;
    let target_now = targets.narrow(1, 0, 1)?.squeeze(1)?;
    let target_next = targets.narrow(1, 1, 1)?.squeeze(1)?;

    let shape = sum_squared_error(&pred_now, &target_now)?;
    let motion = sum_squared_error(
        &(&pred_next - &pred_now)?,
        &(&target_next - &target_now)?,
    )?;
    let emotion = sum_squared_error(mood_now, mood_next)?;

    let total = ((&shape + &motion)? + &emotion)?;
    let breakdown = LossBreakdown {
        shape: shape.to_scalar::<f32>()?,
        motion: motion.to_scalar::<f32>()?,
        emotion: emotion.to_scalar::<f32>()?,
    };
    Ok((total, breakdown))
}
