//! Concatenation, joining and region extraction

use smallvec::smallvec;

use super::recorded;
use crate::error::{Error, Result};
use crate::matrix::{DenseMatrix, JoinDirection, Matrix, MatrixFactory, MatrixKind, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Structural operations producing new matrices
pub trait StructureOps {
    /// Copy of `self` stacked on top of `other`
    ///
    /// The result is sparse when both operands are sparse, dense otherwise.
    fn concatenate_vertical(&self, other: &Matrix) -> Result<Matrix>;

    /// Copy of `self` placed left of `other`
    fn concatenate_horizontal(&self, other: &Matrix) -> Result<Matrix>;

    /// Joined matrix referencing `self` and `other` without copying
    fn join_with(&self, other: &Matrix, direction: JoinDirection) -> Result<Matrix>;

    /// Copy of the `rows x columns` region starting at (row, column)
    fn unjoin(&self, row: usize, column: usize, rows: usize, columns: usize) -> Result<Matrix>;

    /// Split into two copies joined along `direction`
    ///
    /// `Vertical` cuts between rows `at - 1` and `at`, `Horizontal` between
    /// columns. `at` must leave both parts non-empty. Joined input is
    /// [`Error::IllegalOperation`].
    fn split(&self, at: usize, direction: JoinDirection) -> Result<Matrix>;

    /// Scatter a region gradient back into a zeroed `source_rows x source_columns` matrix
    fn unjoin_gradient(
        &self,
        row: usize,
        column: usize,
        source_rows: usize,
        source_columns: usize,
    ) -> Result<Matrix>;
}

/// Fresh matrix for combining `first` and `second`
fn combined(first: &Matrix, second: &Matrix, rows: usize, columns: usize) -> Matrix {
    if first.kind() == MatrixKind::Sparse && second.kind() == MatrixKind::Sparse {
        first.new_matrix_sized(rows, columns)
    } else {
        DenseMatrix::new(rows, columns).into()
    }
}

/// Copy `source` into `target` with its top left corner at (row, column)
fn place(source: &Matrix, target: &mut Matrix, row: usize, column: usize) {
    for r in 0..source.rows() {
        for c in 0..source.columns() {
            target.set_value(row + r, column + c, source.value(r, c));
        }
    }
}

fn check_region(op: &'static str, shape: [usize; 2], row: usize, column: usize, rows: usize, columns: usize) -> Result<()> {
    if row + rows > shape[0] || column + columns > shape[1] {
        tracing::debug!(op, row, column, rows, columns, ?shape, "region outside matrix");
        let (index, size) = if row + rows > shape[0] {
            (row + rows, shape[0])
        } else {
            (column + columns, shape[1])
        };
        return Err(Error::IndexOutOfBounds { index, size });
    }
    Ok(())
}

/// Copy of the region without recording
fn region(matrix: &Matrix, row: usize, column: usize, rows: usize, columns: usize) -> Matrix {
    let mut part = match matrix.kind() {
        MatrixKind::Sparse => matrix.new_matrix_sized(rows, columns),
        _ => DenseMatrix::new(rows, columns).into(),
    };
    for r in 0..rows {
        for c in 0..columns {
            part.set_value(r, c, matrix.value(row + r, column + c));
        }
    }
    part
}

impl StructureOps for Matrix {
    fn concatenate_vertical(&self, other: &Matrix) -> Result<Matrix> {
        if self.columns() != other.columns() {
            tracing::debug!(lhs = ?self.shape(), rhs = ?other.shape(), "column counts differ");
            return Err(Error::incompatible_dimensions(
                "concatenate_vertical",
                self.shape(),
                other.shape(),
            ));
        }
        let mut result = combined(self, other, self.rows() + other.rows(), self.columns());
        recorded(ExpressionKind::Concatenate, &[self, other], &mut result, smallvec![], |result| {
            place(self, result, 0, 0);
            place(other, result, self.rows(), 0);
            Ok(())
        })?;
        Ok(result)
    }

    fn concatenate_horizontal(&self, other: &Matrix) -> Result<Matrix> {
        if self.rows() != other.rows() {
            tracing::debug!(lhs = ?self.shape(), rhs = ?other.shape(), "row counts differ");
            return Err(Error::incompatible_dimensions(
                "concatenate_horizontal",
                self.shape(),
                other.shape(),
            ));
        }
        let mut result = combined(self, other, self.rows(), self.columns() + other.columns());
        recorded(ExpressionKind::Concatenate, &[self, other], &mut result, smallvec![], |result| {
            place(self, result, 0, 0);
            place(other, result, 0, self.columns());
            Ok(())
        })?;
        Ok(result)
    }

    fn join_with(&self, other: &Matrix, direction: JoinDirection) -> Result<Matrix> {
        let mut result = Matrix::join(&[self, other], direction)?;
        recorded(ExpressionKind::Join, &[self, other], &mut result, smallvec![], |_| Ok(()))?;
        Ok(result)
    }

    fn unjoin(&self, row: usize, column: usize, rows: usize, columns: usize) -> Result<Matrix> {
        check_region("unjoin", self.shape(), row, column, rows, columns)?;
        let mut result = region(self, row, column, rows, columns);
        let settings = smallvec![
            ("row", row as f64),
            ("column", column as f64),
            ("rows", rows as f64),
            ("columns", columns as f64)
        ];
        recorded(ExpressionKind::Unjoin, &[self], &mut result, settings, |_| Ok(()))?;
        Ok(result)
    }

    fn split(&self, at: usize, direction: JoinDirection) -> Result<Matrix> {
        if self.kind() == MatrixKind::Joined {
            return Err(Error::illegal_operation("split", "joined matrices cannot be split"));
        }
        let [rows, columns] = self.shape();
        let extent = match direction {
            JoinDirection::Vertical => rows,
            JoinDirection::Horizontal => columns,
        };
        if at == 0 || at >= extent {
            tracing::debug!(at, extent, ?direction, "split position rejected");
            return Err(Error::invalid_argument(
                "at",
                format!("must be in 1..{extent}, got {at}"),
            ));
        }
        let (first, second) = match direction {
            JoinDirection::Vertical => (
                region(self, 0, 0, at, columns),
                region(self, at, 0, rows - at, columns),
            ),
            JoinDirection::Horizontal => (
                region(self, 0, 0, rows, at),
                region(self, 0, at, rows, columns - at),
            ),
        };
        let mut result = Matrix::join(&[&first, &second], direction)?;
        recorded(ExpressionKind::Split, &[self], &mut result, smallvec![("at", at as f64)], |_| Ok(()))?;
        Ok(result)
    }

    fn unjoin_gradient(
        &self,
        row: usize,
        column: usize,
        source_rows: usize,
        source_columns: usize,
    ) -> Result<Matrix> {
        check_region(
            "unjoin_gradient",
            [source_rows, source_columns],
            row,
            column,
            self.rows(),
            self.columns(),
        )?;
        let mut gradient = self.new_matrix_sized(source_rows, source_columns);
        for r in 0..self.rows() {
            for c in 0..self.columns() {
                gradient.increment_by_value(row + r, column + c, self.value(r, c));
            }
        }
        Ok(gradient)
    }
}
