//! Fresh result buffers without knowing the concrete kind

use super::{DenseMatrix, JoinedMatrix, Matrix, MatrixStorage};
#[cfg(feature = "sparse")]
use super::SparseMatrix;

/// Produce new matrices matching an existing one
pub trait MatrixFactory {
    /// Zeroed matrix of the same kind and shape, without mask or recorder
    fn new_matrix(&self) -> Matrix;

    /// Zeroed matrix of the same storage kind with the given shape
    ///
    /// Joined matrices produce a dense matrix.
    fn new_matrix_sized(&self, rows: usize, columns: usize) -> Matrix;

    /// Scalar matrix of the same storage kind holding `value`
    fn constant_matrix(&self, value: f64) -> Matrix;
}

impl MatrixFactory for Matrix {
    fn new_matrix(&self) -> Matrix {
        match self {
            Matrix::Dense(m) if m.is_scalar() => DenseMatrix::scalar(0.0).into(),
            Matrix::Dense(m) => DenseMatrix::new(m.rows(), m.columns()).into(),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) if m.is_scalar() => SparseMatrix::scalar(0.0).into(),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) => SparseMatrix::new(m.rows(), m.columns()).into(),
            Matrix::Joined(m) => JoinedMatrix::new_like(m).into(),
        }
    }

    fn new_matrix_sized(&self, rows: usize, columns: usize) -> Matrix {
        match self {
            #[cfg(feature = "sparse")]
            Matrix::Sparse(_) => SparseMatrix::new(rows, columns).into(),
            _ => DenseMatrix::new(rows, columns).into(),
        }
    }

    fn constant_matrix(&self, value: f64) -> Matrix {
        match self {
            #[cfg(feature = "sparse")]
            Matrix::Sparse(_) => SparseMatrix::scalar(value).into(),
            _ => DenseMatrix::scalar(value).into(),
        }
    }
}
