//! Normalization, gradient clipping and thresholding

use smallvec::smallvec;

use super::elementwise::{ElementwiseOps, map_kernel};
use super::recorded;
use super::reduce::ReduceOps;
use crate::error::{Error, Result};
use crate::matrix::{Matrix, MatrixFactory};
use crate::recorder::ExpressionKind;

/// Normalization operations
pub trait NormalizeOps {
    /// `(v - mean) / std` over the unmasked cells
    ///
    /// A constant matrix uses a divisor of 1. Masked cells stay 0.
    fn normalize(&self) -> Result<Matrix>;

    /// Rescale so that the L2 norm is at most `threshold`
    ///
    /// A matrix whose norm is within the threshold comes back unchanged.
    /// `threshold` must be positive.
    fn clip_gradient(&self, threshold: f64) -> Result<Matrix>;

    /// 1 for cells at or above `threshold`, 0 below
    ///
    /// Masked cells stay 0. Not recorded.
    fn classify(&self, threshold: f64) -> Matrix;
}

impl NormalizeOps for Matrix {
    fn normalize(&self) -> Result<Matrix> {
        let mean = self.mean();
        let deviation = self.standard_deviation_about(mean);
        let divisor = if deviation != 0.0 { deviation } else { 1.0 };
        let mut result = self.new_matrix();
        let settings = smallvec![("mean", mean), ("std", deviation)];
        recorded(ExpressionKind::Normalize, &[self], &mut result, settings, |result| {
            map_kernel(self, result, |v| (v - mean) / divisor);
            Ok(())
        })?;
        Ok(result)
    }

    fn clip_gradient(&self, threshold: f64) -> Result<Matrix> {
        if threshold.is_nan() || threshold <= 0.0 {
            tracing::debug!(threshold, "clip threshold rejected");
            return Err(Error::invalid_argument(
                "threshold",
                format!("{threshold} must be positive"),
            ));
        }
        let norm = self.norm(2)?;
        let factor = if norm > threshold { threshold / norm } else { 1.0 };
        self.multiply_by(factor)
    }

    fn classify(&self, threshold: f64) -> Matrix {
        let mut result = self.new_matrix();
        map_kernel(self, &mut result, |v| if v < threshold { 0.0 } else { 1.0 });
        result
    }
}
