//! Reductions over the unmasked cells of a matrix

use smallvec::smallvec;

use super::conv_common::validate_positive;
use super::elementwise::map_kernel;
use super::recorded;
use crate::error::Result;
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Reductions
///
/// Masked cells are excluded from every reduction, including the counts used
/// as divisors.
pub trait ReduceOps {
    /// Sum of `f(value)` and the number of unmasked cells
    fn count<F: Fn(f64) -> f64>(&self, f: F) -> (f64, usize);

    /// Sum of unmasked cells
    fn sum(&self) -> f64;

    /// Mean of unmasked cells; NaN when every cell is masked
    fn mean(&self) -> f64;

    /// Mean squared deviation from the mean
    fn variance(&self) -> f64;

    /// Mean squared deviation from `mean`; 0 when every cell is masked
    fn variance_about(&self, mean: f64) -> f64;

    /// Square root of [`ReduceOps::variance`]
    fn standard_deviation(&self) -> f64;

    /// Square root of [`ReduceOps::variance_about`]
    fn standard_deviation_about(&self, mean: f64) -> f64;

    /// `(Σ |x|^p)^(1/p)`; `p` must be at least 1
    fn norm(&self, p: u32) -> Result<f64>;

    /// Smallest unmasked value; `+inf` when every cell is masked
    fn min(&self) -> f64;

    /// Largest unmasked value; `-inf` when every cell is masked
    fn max(&self) -> f64;

    /// Coordinate of the first smallest unmasked value
    fn arg_min(&self) -> Option<(usize, usize)>;

    /// Coordinate of the first largest unmasked value
    fn arg_max(&self) -> Option<(usize, usize)>;

    /// Linearly rescale values so that min maps to `new_min` and max to `new_max`
    ///
    /// A constant matrix uses a divisor of 1.
    fn min_max(&self, new_min: f64, new_max: f64) -> Result<Matrix>;

    /// Mean of `-v * log2(v)` over unmasked cells
    ///
    /// Zero cells contribute 0. NaN when every cell is masked.
    fn entropy(&self) -> f64;

    /// [`ReduceOps::sum`] as a scalar matrix
    fn sum_as_matrix(&self) -> Result<Matrix>;

    /// [`ReduceOps::mean`] as a scalar matrix
    fn mean_as_matrix(&self) -> Result<Matrix>;
}

/// Visit every unmasked cell
fn for_each_unmasked<F: FnMut(usize, usize, f64)>(matrix: &Matrix, mut f: F) {
    let [rows, columns] = matrix.shape();
    let masked = matrix.has_mask();
    for r in 0..rows {
        for c in 0..columns {
            if !masked || !matrix.is_masked(r, c) {
                f(r, c, matrix.value(r, c));
            }
        }
    }
}

/// Position of the first value winning under `better(candidate, best)`
fn arg_extreme<F: Fn(f64, f64) -> bool>(matrix: &Matrix, better: F) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for_each_unmasked(matrix, |r, c, v| {
        if best.is_none_or(|(_, _, b)| better(v, b)) {
            best = Some((r, c, v));
        }
    });
    best
}

impl ReduceOps for Matrix {
    fn count<F: Fn(f64) -> f64>(&self, f: F) -> (f64, usize) {
        let mut sum = 0.0;
        let mut n = 0;
        for_each_unmasked(self, |_, _, v| {
            sum += f(v);
            n += 1;
        });
        (sum, n)
    }

    fn sum(&self) -> f64 {
        self.count(|v| v).0
    }

    fn mean(&self) -> f64 {
        let (sum, n) = self.count(|v| v);
        sum / n as f64
    }

    fn variance(&self) -> f64 {
        self.variance_about(self.mean())
    }

    fn variance_about(&self, mean: f64) -> f64 {
        let (sum, n) = self.count(|v| (v - mean).powi(2));
        if n > 0 { sum / n as f64 } else { 0.0 }
    }

    fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    fn standard_deviation_about(&self, mean: f64) -> f64 {
        self.variance_about(mean).sqrt()
    }

    fn norm(&self, p: u32) -> Result<f64> {
        validate_positive(p as usize, "p", "norm")?;
        let exponent = p as i32;
        let (sum, _) = self.count(|v| v.abs().powi(exponent));
        Ok(sum.powf(1.0 / p as f64))
    }

    fn min(&self) -> f64 {
        arg_extreme(self, |v, best| v < best).map_or(f64::INFINITY, |(_, _, v)| v)
    }

    fn max(&self) -> f64 {
        arg_extreme(self, |v, best| v > best).map_or(f64::NEG_INFINITY, |(_, _, v)| v)
    }

    fn arg_min(&self) -> Option<(usize, usize)> {
        arg_extreme(self, |v, best| v < best).map(|(r, c, _)| (r, c))
    }

    fn arg_max(&self) -> Option<(usize, usize)> {
        arg_extreme(self, |v, best| v > best).map(|(r, c, _)| (r, c))
    }

    fn min_max(&self, new_min: f64, new_max: f64) -> Result<Matrix> {
        let minimum = ReduceOps::min(self);
        let maximum = ReduceOps::max(self);
        let delta = if maximum - minimum != 0.0 { maximum - minimum } else { 1.0 };
        let mut result = self.new_matrix();
        map_kernel(self, &mut result, |v| (v - minimum) / delta * (new_max - new_min) + new_min);
        Ok(result)
    }

    fn entropy(&self) -> f64 {
        let (sum, n) = self.count(|v| if v == 0.0 { 0.0 } else { -v * v.log2() });
        sum / n as f64
    }

    fn sum_as_matrix(&self) -> Result<Matrix> {
        let mut result = self.constant_matrix(0.0);
        recorded(ExpressionKind::Sum, &[self], &mut result, smallvec![], |result| {
            result.set_value(0, 0, self.sum());
            Ok(())
        })?;
        Ok(result)
    }

    fn mean_as_matrix(&self) -> Result<Matrix> {
        let mut result = self.constant_matrix(0.0);
        recorded(ExpressionKind::Mean, &[self], &mut result, smallvec![], |result| {
            result.set_value(0, 0, self.mean());
            Ok(())
        })?;
        Ok(result)
    }
}
