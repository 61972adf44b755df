//! Matrix product

use smallvec::smallvec;

use super::conv_common::validate_result_shape;
use super::{any_masked, recorded};
use crate::error::{Error, Result};
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Matrix product operations
pub trait LinalgOps {
    /// Matrix product `self · other`
    ///
    /// Requires `self.columns() == other.rows()`; the result is
    /// `self.rows() x other.columns()` of the storage kind of `self`.
    fn dot(&self, other: &Matrix) -> Result<Matrix>;

    /// Matrix product written into `result`, which is overwritten
    fn dot_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()>;
}

/// Validates that inner dimensions agree and returns the product shape.
#[inline]
fn product_shape(first: &Matrix, second: &Matrix) -> Result<[usize; 2]> {
    if first.columns() != second.rows() {
        tracing::debug!(lhs = ?first.shape(), rhs = ?second.shape(), "dot inner dimensions differ");
        return Err(Error::incompatible_dimensions("dot", first.shape(), second.shape()));
    }
    Ok([first.rows(), second.columns()])
}

impl LinalgOps for Matrix {
    fn dot(&self, other: &Matrix) -> Result<Matrix> {
        let [rows, columns] = product_shape(self, other)?;
        let mut result = self.new_matrix_sized(rows, columns);
        self.dot_into(other, &mut result)?;
        Ok(result)
    }

    fn dot_into(&self, other: &Matrix, result: &mut Matrix) -> Result<()> {
        let [rows, columns] = product_shape(self, other)?;
        validate_result_shape(result, [rows, columns])?;
        let inner = self.columns();
        let masked = any_masked(&[self, other]);
        recorded(ExpressionKind::Dot, &[self, other], result, smallvec![], |result| {
            for r in 0..rows {
                for c in 0..columns {
                    let mut sum = 0.0;
                    for k in 0..inner {
                        // masked cells drop out of the contraction
                        if masked && (self.is_masked(r, k) || other.is_masked(k, c)) {
                            continue;
                        }
                        sum += self.value(r, k) * other.value(k, c);
                    }
                    result.set_value(r, c, sum);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot() {
        let a = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let b = Matrix::from_rows(&[[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]]).unwrap();
        let c = a.dot(&b).unwrap();
        assert_eq!(c.shape(), [2, 2]);
        assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_dot_shape_errors() {
        let a = Matrix::dense(2, 3);
        assert!(matches!(
            a.dot(&Matrix::dense(2, 3)),
            Err(Error::IncompatibleDimensions { op: "dot", .. })
        ));
        let mut result = Matrix::dense(3, 3);
        assert!(matches!(
            a.dot_into(&Matrix::dense(3, 2), &mut result),
            Err(Error::ResultShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_dot_with_transposed_view() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let gram = a.transpose().dot(&a).unwrap();
        assert_eq!(gram.to_vec(), vec![10.0, 14.0, 14.0, 20.0]);
    }

    #[test]
    fn test_masked_contraction() {
        let mut a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        a.set_column_mask_at(1, true);
        let b = Matrix::from_rows(&[[1.0], [1.0]]).unwrap();
        assert_eq!(a.dot(&b).unwrap().to_vec(), vec![1.0, 3.0]);
    }
}
