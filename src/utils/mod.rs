//! Utility functions and helpers
//!
//! This module provides common utilities used across the crate.

/// Smoothing filters
pub mod filters {
    //! Savitzky-Golay smoothing (quadratic fit), used to smooth the random
    //! mood-table initialization along the frame axis.

    /// Smooth a sequence with a quadratic Savitzky-Golay filter.
    ///
    /// Interior points use the closed-form convolution weights; the first
    /// and last `window / 2` points are filled by evaluating a quadratic
    /// least-squares fit over the first/last full window. When the sequence
    /// is shorter than `window`, the window is clamped to the largest odd
    /// length that fits; sequences too short to fit a quadratic are
    /// returned unchanged.
    pub fn savgol_smooth(values: &[f32], window: usize) -> Vec<f32> {
        let len = values.len();
        let mut window = window.min(len);
        if window % 2 == 0 {
            window = window.saturating_sub(1);
        }
        if window < 5 {
            return values.to_vec();
        }
        let half = window / 2;

        let weights = convolution_weights(half);
        let mut out = vec![0.0f32; len];

        for i in half..len - half {
            let acc: f64 = values[i - half..=i + half]
                .iter()
                .zip(&weights)
                .map(|(&v, &w)| v as f64 * w)
                .sum();
            out[i] = acc as f32;
        }

        let (a, b, c) = fit_quadratic(&values[..window]);
        for (i, o) in out.iter_mut().take(half).enumerate() {
            let x = i as f64;
            *o = (a + b * x + c * x * x) as f32;
        }

        let (a, b, c) = fit_quadratic(&values[len - window..]);
        for (j, o) in out.iter_mut().skip(len - half).enumerate() {
            let x = (window - half + j) as f64;
            *o = (a + b * x + c * x * x) as f32;
        }

        out
    }

    /// Smooth each column of a row-major `(rows, cols)` matrix independently
    pub fn smooth_columns(data: &[f32], rows: usize, cols: usize, window: usize) -> Vec<f32> {
        debug_assert_eq!(data.len(), rows * cols);
        let mut out = data.to_vec();
        let mut column = vec![0.0f32; rows];
        for c in 0..cols {
            for r in 0..rows {
                column[r] = data[r * cols + c];
            }
            let smoothed = savgol_smooth(&column, window);
            for r in 0..rows {
                out[r * cols + c] = smoothed[r];
            }
        }
        out
    }

    /// Closed-form quadratic smoothing weights for a window of `2h + 1`
    fn convolution_weights(h: usize) -> Vec<f64> {
        let m = h as f64;
        let denom = (2.0 * m + 3.0) * (2.0 * m + 1.0) * (2.0 * m - 1.0);
        (-(h as i64)..=h as i64)
            .map(|i| {
                let i = i as f64;
                (3.0 * (3.0 * m * m + 3.0 * m - 1.0) - 15.0 * i * i) / denom
            })
            .collect()
    }

    /// Least-squares quadratic `a + b x + c x^2` over `ys` at `x = 0..len`
    fn fit_quadratic(ys: &[f32]) -> (f64, f64, f64) {
        let n = ys.len();
        let (mut s1, mut s2, mut s3, mut s4) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        let (mut t0, mut t1, mut t2) = (0.0f64, 0.0f64, 0.0f64);
        for (j, &y) in ys.iter().enumerate() {
            let x = j as f64;
            let y = y as f64;
            s1 += x;
            s2 += x * x;
            s3 += x * x * x;
            s4 += x * x * x * x;
            t0 += y;
            t1 += x * y;
            t2 += x * x * y;
        }
        let s0 = n as f64;

        let det = s0 * (s2 * s4 - s3 * s3) - s1 * (s1 * s4 - s3 * s2) + s2 * (s1 * s3 - s2 * s2);
        let a = (t0 * (s2 * s4 - s3 * s3) - s1 * (t1 * s4 - s3 * t2) + s2 * (t1 * s3 - s2 * t2))
            / det;
        let b = (s0 * (t1 * s4 - t2 * s3) - t0 * (s1 * s4 - s3 * s2) + s2 * (s1 * t2 - t1 * s2))
            / det;
        let c = (s0 * (s2 * t2 - s3 * t1) - s1 * (s1 * t2 - s3 * t0) + t0 * (s1 * s3 - s2 * s2))
            / det;
        (a, b, c)
    }

}
