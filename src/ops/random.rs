//! Dropout and sampling driven by a random generator
//!
//! Each operation has a `_with_rng` form taking any [`Rng`]; the plain form
//! uses the thread-local generator.

use rand::Rng;
use smallvec::smallvec;

use super::elementwise::map_kernel;
use super::recorded;
use crate::error::{Error, Result};
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Random operations
pub trait RandomOps {
    /// Inverted dropout with row keep probability `keep`
    ///
    /// The result holds `v / keep` and each of its rows is masked with
    /// probability `1 - keep`. `keep` must be in `(0, 1]`.
    fn dropout(&self, keep: f64) -> Result<Matrix>;

    /// [`RandomOps::dropout`] with a caller supplied generator
    fn dropout_with_rng<R: Rng + ?Sized>(&self, keep: f64, rng: &mut R) -> Result<Matrix>;

    /// Draw a cell with probability proportional to its value
    ///
    /// Walks the unmasked cells in row-major order and returns the first whose
    /// running sum reaches a uniform draw in `[0, 1)`. `None` when the running
    /// sum never gets there.
    fn sample(&self) -> Option<(usize, usize)>;

    /// [`RandomOps::sample`] with a caller supplied generator
    fn sample_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(usize, usize)>;
}

impl RandomOps for Matrix {
    fn dropout(&self, keep: f64) -> Result<Matrix> {
        self.dropout_with_rng(keep, &mut rand::rng())
    }

    fn dropout_with_rng<R: Rng + ?Sized>(&self, keep: f64, rng: &mut R) -> Result<Matrix> {
        if keep.is_nan() || keep <= 0.0 || keep > 1.0 {
            tracing::debug!(keep, "dropout keep probability rejected");
            return Err(Error::invalid_argument(
                "keep",
                format!("must be in (0, 1], got {keep}"),
            ));
        }
        let mut result = self.new_matrix();
        recorded(ExpressionKind::Dropout, &[self], &mut result, smallvec![("keep", keep)], |result| {
            map_kernel(self, result, |v| v / keep);
            result.mask_row_by_probability_with_rng(1.0 - keep, rng)
        })?;
        Ok(result)
    }

    fn sample(&self) -> Option<(usize, usize)> {
        self.sample_with_rng(&mut rand::rng())
    }

    fn sample_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(usize, usize)> {
        let threshold = rng.random::<f64>();
        let [rows, columns] = self.shape();
        let masked = self.has_mask();
        let mut cumulative = 0.0;
        for r in 0..rows {
            for c in 0..columns {
                if masked && self.is_masked(r, c) {
                    continue;
                }
                cumulative += self.value(r, c);
                if cumulative >= threshold {
                    return Some((r, c));
                }
            }
        }
        None
    }
}
