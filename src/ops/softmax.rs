//! Softmax, Gumbel softmax and the softmax Jacobian for column vectors

use rand::Rng;
use smallvec::smallvec;

use super::conv_common::validate_result_shape;
use super::recorded;
use crate::error::{Error, Result};
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Offset keeping the logarithms of the Gumbel noise finite
const GUMBEL_EPSILON: f64 = 1e-7;

/// Softmax family over column vectors
///
/// Only unmasked cells take part in the maximum, the exponentials and the
/// normalizing sum. Masked cells of the result are 0.
pub trait SoftmaxOps {
    /// `exp(x - max) / Σ exp(x - max)`
    fn softmax(&self) -> Result<Matrix>;

    /// [`SoftmaxOps::softmax`] written into `result`
    fn softmax_into(&self, result: &mut Matrix) -> Result<()>;

    /// Softmax of `(ln(sigmoid(x)) + g) / tau` with Gumbel noise `g`
    fn gumbel_softmax(&self, tau: f64) -> Result<Matrix>;

    /// [`SoftmaxOps::gumbel_softmax`] with a caller supplied generator
    fn gumbel_softmax_with_rng<R: Rng + ?Sized>(&self, tau: f64, rng: &mut R) -> Result<Matrix>;

    /// Jacobian `J(i, j) = δ(i, j) - s(i)` where `self` holds the softmax output `s`
    ///
    /// Rows of masked cells are left 0.
    fn softmax_grad(&self) -> Result<Matrix>;
}

fn validate_column_vector(matrix: &Matrix, op: &'static str) -> Result<()> {
    if matrix.columns() != 1 {
        tracing::debug!(op, shape = ?matrix.shape(), "softmax input is not a column vector");
        return Err(Error::invalid_argument("input", "Matrix must be a column vector"));
    }
    Ok(())
}

/// Gumbel noise `-ln(-ln(u + ε) + ε)` for uniform `u`
fn gumbel_noise<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u: f64 = rng.random();
    -(-(u + GUMBEL_EPSILON).ln() + GUMBEL_EPSILON).ln()
}

/// `ln(1 / (1 + e^-x))` without overflow for large positive `x`
#[inline]
fn ln_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

/// Normalized exponentials of `logits` into `result`, skipping masked rows
fn normalize_into(input: &Matrix, logits: &[Option<f64>], result: &mut Matrix) {
    let max = logits
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<Option<f64>> = logits.iter().map(|l| l.map(|l| (l - max).exp())).collect();
    let total: f64 = exps.iter().flatten().sum();
    for (r, e) in exps.iter().enumerate() {
        let value = e.map_or(0.0, |e| e / total);
        result.set_value(r, 0, value);
    }
    tracing::trace!(rows = input.rows(), total, "softmax normalized");
}

/// Unmasked values of a column vector, `None` where masked
fn column_logits<F: FnMut(f64) -> f64>(input: &Matrix, mut f: F) -> Vec<Option<f64>> {
    let masked = input.has_mask();
    (0..input.rows())
        .map(|r| (!masked || !input.is_masked(r, 0)).then(|| f(input.value(r, 0))))
        .collect()
}

impl SoftmaxOps for Matrix {
    fn softmax(&self) -> Result<Matrix> {
        validate_column_vector(self, "softmax")?;
        let mut result = self.new_matrix();
        self.softmax_into(&mut result)?;
        Ok(result)
    }

    fn softmax_into(&self, result: &mut Matrix) -> Result<()> {
        validate_column_vector(self, "softmax")?;
        validate_result_shape(result, self.shape())?;
        recorded(ExpressionKind::Softmax, &[self], result, smallvec![], |result| {
            let logits = column_logits(self, |x| x);
            normalize_into(self, &logits, result);
            Ok(())
        })
    }

    fn gumbel_softmax(&self, tau: f64) -> Result<Matrix> {
        self.gumbel_softmax_with_rng(tau, &mut rand::rng())
    }

    fn gumbel_softmax_with_rng<R: Rng + ?Sized>(&self, tau: f64, rng: &mut R) -> Result<Matrix> {
        validate_column_vector(self, "gumbel_softmax")?;
        if tau.is_nan() || tau <= 0.0 {
            return Err(Error::invalid_argument(
                "tau",
                format!("gumbel_softmax requires tau > 0, got {tau}"),
            ));
        }
        let mut result = self.new_matrix();
        recorded(
            ExpressionKind::GumbelSoftmax,
            &[self],
            &mut result,
            smallvec![("tau", tau)],
            |result| {
                let logits = column_logits(self, |x| (ln_sigmoid(x) + gumbel_noise(rng)) / tau);
                normalize_into(self, &logits, result);
                Ok(())
            },
        )?;
        Ok(result)
    }

    fn softmax_grad(&self) -> Result<Matrix> {
        validate_column_vector(self, "softmax_grad")?;
        let rows = self.rows();
        let mut result = self.new_matrix_sized(rows, rows);
        let masked = self.has_mask();
        for i in 0..rows {
            if masked && self.is_masked(i, 0) {
                continue;
            }
            let s = self.value(i, 0);
            for j in 0..rows {
                let delta = if i == j { 1.0 } else { 0.0 };
                result.set_value(i, j, delta - s);
            }
        }
        Ok(result)
    }
}
