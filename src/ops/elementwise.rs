//! Element-wise unary and binary operations with scalar broadcasting

use smallvec::smallvec;

use super::conv_common::validate_result_shape;
use super::{any_masked, recorded};
use crate::error::{Error, Result};
use crate::function::{BinaryFunction, BinaryFunctionType, UnaryFunction};
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Element-wise operations
///
/// # Broadcasting
///
/// Binary operations require equal shapes unless one operand is a scalar
/// (1x1) matrix, whose value is then used for every cell of the other. The
/// iteration bounds and the result kind come from `self` unless `self` is the
/// scalar, in which case they come from `other`.
///
/// Masked cells of either operand are skipped and keep the value the result
/// already holds (zero for freshly created results).
pub trait ElementwiseOps {
    /// Apply `function` to every cell
    fn apply(&self, function: &UnaryFunction) -> Result<Matrix>;

    /// Apply `function` to every cell, writing into `result`
    fn apply_into(&self, function: &UnaryFunction, result: &mut Matrix) -> Result<()>;

    /// Apply the derivative of `function` to every cell
    fn apply_derivative(&self, function: &UnaryFunction) -> Result<Matrix>;

    /// Apply `function(self, other)` cell by cell
    fn apply_bi(&self, other: &Matrix, function: &BinaryFunction) -> Result<Matrix>;

    /// Apply `function(self, other)` cell by cell, writing into `result`
    fn apply_bi_into(&self, other: &Matrix, function: &BinaryFunction, result: &mut Matrix) -> Result<()>;

    /// Apply the derivative of `function` with respect to `self` cell by cell
    fn apply_bi_derivative(&self, other: &Matrix, function: &BinaryFunction) -> Result<Matrix>;

    /// Element-wise sum
    fn add(&self, other: &Matrix) -> Result<Matrix>;

    /// Element-wise sum into `result`
    fn add_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;

    /// Element-wise difference
    fn subtract(&self, other: &Matrix) -> Result<Matrix>;

    /// Element-wise difference into `result`
    fn subtract_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;

    /// Element-wise (Hadamard) product
    fn multiply(&self, other: &Matrix) -> Result<Matrix>;

    /// Element-wise product into `result`
    fn multiply_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;

    /// Element-wise quotient
    fn divide(&self, other: &Matrix) -> Result<Matrix>;

    /// Element-wise quotient into `result`
    fn divide_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;

    /// Element-wise maximum
    fn maximum(&self, other: &Matrix) -> Result<Matrix>;

    /// Element-wise maximum into `result`
    fn maximum_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;

    /// Element-wise minimum
    fn minimum(&self, other: &Matrix) -> Result<Matrix>;

    /// Element-wise minimum into `result`
    fn minimum_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;

    /// Multiply every cell by `factor`
    fn multiply_by(&self, factor: f64) -> Result<Matrix>;

    /// Add `constant` to every cell
    fn add_constant(&self, constant: f64) -> Result<Matrix>;

    /// `beta * previous + (1 - beta) * self`
    ///
    /// Without a previous average the result is a reference to `self`.
    fn exponential_moving_average(&self, previous: Option<&Matrix>, beta: f64) -> Result<Matrix>;
}

// ============================================================================
// Kernels
// ============================================================================

/// Shape of a broadcasting binary operation
pub(crate) fn broadcast_shape(op: &'static str, first: &Matrix, second: &Matrix) -> Result<[usize; 2]> {
    if first.is_scalar() {
        return Ok(second.shape());
    }
    if second.is_scalar() || first.shape() == second.shape() {
        return Ok(first.shape());
    }
    tracing::debug!(op, lhs = ?first.shape(), rhs = ?second.shape(), "shapes do not broadcast");
    Err(Error::incompatible_dimensions(op, first.shape(), second.shape()))
}

/// Fresh result for a broadcasting binary operation
fn binary_result(first: &Matrix, second: &Matrix) -> Matrix {
    if first.is_scalar() {
        second.new_matrix()
    } else {
        first.new_matrix()
    }
}

/// Write `f(input)` into every unmasked cell of `result`
pub(crate) fn map_kernel<F>(input: &Matrix, result: &mut Matrix, f: F)
where
    F: Fn(f64) -> f64,
{
    let [rows, columns] = input.shape();
    if !input.has_mask() {
        for r in 0..rows {
            for c in 0..columns {
                result.set_value(r, c, f(input.value(r, c)));
            }
        }
    } else {
        for r in 0..rows {
            for c in 0..columns {
                if !input.is_masked(r, c) {
                    result.set_value(r, c, f(input.value(r, c)));
                }
            }
        }
    }
}

/// Write `f(first, second)` into every cell unmasked in both operands
pub(crate) fn zip_kernel<F>(first: &Matrix, second: &Matrix, result: &mut Matrix, rows: usize, columns: usize, f: F)
where
    F: Fn(f64, f64) -> f64,
{
    if !any_masked(&[first, second]) {
        for r in 0..rows {
            for c in 0..columns {
                result.set_value(r, c, f(first.value(r, c), second.value(r, c)));
            }
        }
    } else {
        for r in 0..rows {
            for c in 0..columns {
                if !first.is_masked(r, c) && !second.is_masked(r, c) {
                    result.set_value(r, c, f(first.value(r, c), second.value(r, c)));
                }
            }
        }
    }
}

/// Validated broadcasting binary operation into `result`
fn binary_into<F>(
    op: &'static str,
    kind: ExpressionKind,
    first: &Matrix,
    second: &Matrix,
    result: &mut Matrix,
    f: F,
) -> Result<()>
where
    F: Fn(f64, f64) -> f64,
{
    let [rows, columns] = broadcast_shape(op, first, second)?;
    validate_result_shape(result, [rows, columns])?;
    recorded(kind, &[first, second], result, smallvec![], |result| {
        zip_kernel(first, second, result, rows, columns, f);
        Ok(())
    })
}

/// Broadcasting binary operation into a fresh result
fn binary<F>(op: &'static str, kind: ExpressionKind, first: &Matrix, second: &Matrix, f: F) -> Result<Matrix>
where
    F: Fn(f64, f64) -> f64,
{
    broadcast_shape(op, first, second)?;
    let mut result = binary_result(first, second);
    binary_into(op, kind, first, second, &mut result, f)?;
    Ok(result)
}

impl ElementwiseOps for Matrix {
    fn apply(&self, function: &UnaryFunction) -> Result<Matrix> {
        let mut result = self.new_matrix();
        self.apply_into(function, &mut result)?;
        Ok(result)
    }

    fn apply_into(&self, function: &UnaryFunction, result: &mut Matrix) -> Result<()> {
        validate_result_shape(result, self.shape())?;
        let kind = ExpressionKind::Unary(function.function_type());
        recorded(kind, &[self], result, smallvec![], |result| {
            map_kernel(self, result, |x| function.function(x));
            Ok(())
        })
    }

    fn apply_derivative(&self, function: &UnaryFunction) -> Result<Matrix> {
        let mut result = self.new_matrix();
        let kind = ExpressionKind::UnaryDerivative(function.function_type());
        recorded(kind, &[self], &mut result, smallvec![], |result| {
            map_kernel(self, result, |x| function.derivative(x));
            Ok(())
        })?;
        Ok(result)
    }

    fn apply_bi(&self, other: &Matrix, function: &BinaryFunction) -> Result<Matrix> {
        let kind = ExpressionKind::Binary(function.function_type());
        binary(function.function_type().name(), kind, self, other, |v, c| {
            function.function(v, c)
        })
    }

    fn apply_bi_into(&self, other: &Matrix, function: &BinaryFunction, result: &mut Matrix) -> Result<()> {
        let kind = ExpressionKind::Binary(function.function_type());
        binary_into(function.function_type().name(), kind, self, other, result, |v, c| {
            function.function(v, c)
        })
    }

    fn apply_bi_derivative(&self, other: &Matrix, function: &BinaryFunction) -> Result<Matrix> {
        let kind = ExpressionKind::BinaryDerivative(function.function_type());
        binary(function.function_type().name(), kind, self, other, |v, c| {
            function.derivative(v, c)
        })
    }

    fn add(&self, other: &Matrix) -> Result<Matrix> {
        binary("add", ExpressionKind::Add, self, other, |a, b| a + b)
    }

    fn add_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        binary_into("add", ExpressionKind::Add, self, other, result, |a, b| a + b)
    }

    fn subtract(&self, other: &Matrix) -> Result<Matrix> {
        binary("subtract", ExpressionKind::Subtract, self, other, |a, b| a - b)
    }

    fn subtract_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        binary_into("subtract", ExpressionKind::Subtract, self, other, result, |a, b| a - b)
    }

    fn multiply(&self, other: &Matrix) -> Result<Matrix> {
        binary("multiply", ExpressionKind::Multiply, self, other, |a, b| a * b)
    }

    fn multiply_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        binary_into("multiply", ExpressionKind::Multiply, self, other, result, |a, b| a * b)
    }

    fn divide(&self, other: &Matrix) -> Result<Matrix> {
        binary("divide", ExpressionKind::Divide, self, other, |a, b| a / b)
    }

    fn divide_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        binary_into("divide", ExpressionKind::Divide, self, other, result, |a, b| a / b)
    }

    fn maximum(&self, other: &Matrix) -> Result<Matrix> {
        let kind = ExpressionKind::Binary(BinaryFunctionType::Max);
        binary("maximum", kind, self, other, f64::max)
    }

    fn maximum_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        let kind = ExpressionKind::Binary(BinaryFunctionType::Max);
        binary_into("maximum", kind, self, other, result, f64::max)
    }

    fn minimum(&self, other: &Matrix) -> Result<Matrix> {
        let kind = ExpressionKind::Binary(BinaryFunctionType::Min);
        binary("minimum", kind, self, other, f64::min)
    }

    fn minimum_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        let kind = ExpressionKind::Binary(BinaryFunctionType::Min);
        binary_into("minimum", kind, self, other, result, f64::min)
    }

    fn multiply_by(&self, factor: f64) -> Result<Matrix> {
        self.multiply(&self.constant_matrix(factor))
    }

    fn add_constant(&self, constant: f64) -> Result<Matrix> {
        self.add(&self.constant_matrix(constant))
    }

    fn exponential_moving_average(&self, previous: Option<&Matrix>, beta: f64) -> Result<Matrix> {
        match previous {
            None => Ok(self.reference()),
            Some(previous) => previous.multiply_by(beta)?.add(&self.multiply_by(1.0 - beta)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::UnaryFunctionType;

    fn sample() -> Matrix {
        Matrix::from_rows(&[[1.0, -2.0], [3.0, -4.0]]).unwrap()
    }

    #[test]
    fn test_add_and_shape_errors() {
        let a = sample();
        let b = Matrix::from_rows(&[[1.0, 1.0], [1.0, 1.0]]).unwrap();
        assert_eq!(a.add(&b).unwrap().to_vec(), vec![2.0, -1.0, 4.0, -3.0]);

        let wide = Matrix::dense(2, 3);
        assert!(matches!(
            a.add(&wide),
            Err(Error::IncompatibleDimensions { op: "add", .. })
        ));

        let mut wrong = Matrix::dense(3, 3);
        assert_eq!(
            a.add_into(&b, &mut wrong).unwrap_err(),
            Error::ResultShapeMismatch {
                expected: [2, 2],
                got: [3, 3]
            }
        );
    }

    #[test]
    fn test_scalar_on_either_side() {
        let a = sample();
        let two = Matrix::scalar(2.0);
        assert_eq!(a.multiply(&two).unwrap().to_vec(), vec![2.0, -4.0, 6.0, -8.0]);
        let flipped = two.subtract(&a).unwrap();
        assert_eq!(flipped.shape(), [2, 2]);
        assert_eq!(flipped.to_vec(), vec![1.0, 4.0, -1.0, 6.0]);
        assert!(two.add(&Matrix::scalar(1.0)).unwrap().is_scalar());
    }

    #[test]
    fn test_relu_scenario() {
        let relu = UnaryFunction::new(UnaryFunctionType::Relu).unwrap();
        let input = Matrix::column(&[-1.0, 0.0, 2.0]);
        assert_eq!(input.apply(&relu).unwrap().to_vec(), vec![0.0, 0.0, 2.0]);
        let derivative = input.apply_derivative(&relu).unwrap();
        assert_eq!(derivative.value(0, 0), 0.0);
        assert_eq!(derivative.value(2, 0), 1.0);
    }

    #[test]
    fn test_masked_cells_skipped() {
        let mut a = sample();
        a.set_mask_at(0, 1, true);
        let sum = a.add(&Matrix::scalar(10.0)).unwrap();
        assert_eq!(sum.to_vec(), vec![11.0, 0.0, 13.0, 6.0]);

        let mut b = sample();
        b.set_row_mask_at(1, true);
        let product = sample().multiply(&b).unwrap();
        assert_eq!(product.to_vec(), vec![1.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_maximum_minimum() {
        let a = sample();
        let zero = Matrix::scalar(0.0);
        assert_eq!(a.maximum(&zero).unwrap().to_vec(), vec![1.0, 0.0, 3.0, 0.0]);
        assert_eq!(a.minimum(&zero).unwrap().to_vec(), vec![0.0, -2.0, 0.0, -4.0]);
    }

    #[test]
    fn test_exponential_moving_average() {
        let current = Matrix::from_rows(&[[1.0, 1.0]]).unwrap();
        let first = current.exponential_moving_average(None, 0.9).unwrap();
        assert!(first.shares_storage(&current));

        let previous = Matrix::from_rows(&[[0.0, 2.0]]).unwrap();
        let ema = current.exponential_moving_average(Some(&previous), 0.9).unwrap();
        approx::assert_relative_eq!(ema.value(0, 0), 0.1, epsilon = 1e-12);
        approx::assert_relative_eq!(ema.value(0, 1), 1.9, epsilon = 1e-12);
    }

    #[cfg(feature = "sparse")]
    #[test]
    fn test_sparse_result_kind() {
        use crate::matrix::MatrixKind;
        let mut s = Matrix::sparse(2, 2);
        s.set_value(0, 0, 3.0);
        let doubled = s.multiply_by(2.0).unwrap();
        assert_eq!(doubled.kind(), MatrixKind::Sparse);
        assert_eq!(doubled.as_sparse().unwrap().nonzero_count(), 1);
        assert_eq!(doubled.value(0, 0), 6.0);
    }
}
