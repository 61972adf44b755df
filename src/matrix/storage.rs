//! Element access contract shared by all matrix kinds

/// Element access common to dense, sparse and joined matrices
///
/// Coordinates are logical: they already account for transpose and slice
/// views. Scalar matrices report 1x1 and ignore the coordinates passed in.
/// Out-of-range reads return 0 and out-of-range writes are dropped; use
/// [`Matrix::get`](super::Matrix::get) and [`Matrix::set`](super::Matrix::set)
/// for checked access.
pub trait MatrixStorage {
    /// Number of logical rows
    fn rows(&self) -> usize;

    /// Number of logical columns
    fn columns(&self) -> usize;

    /// True for 1x1 matrices that broadcast against any shape
    fn is_scalar(&self) -> bool;

    /// Value at (row, column)
    fn value(&self, row: usize, column: usize) -> f64;

    /// Write the value at (row, column)
    fn set_value(&mut self, row: usize, column: usize, value: f64);

    /// True when (row, column) is suppressed by a cell, row or column mask
    fn is_masked(&self, row: usize, column: usize) -> bool;

    /// True when any mask is attached
    ///
    /// Operations take an unguarded path when neither operand has a mask.
    fn has_mask(&self) -> bool;

    /// Shape as [rows, columns]
    #[inline]
    fn shape(&self) -> [usize; 2] {
        [self.rows(), self.columns()]
    }

    /// Total number of logical cells
    #[inline]
    fn size(&self) -> usize {
        self.rows() * self.columns()
    }

    /// True for single-column matrices
    #[inline]
    fn is_column_vector(&self) -> bool {
        self.columns() == 1
    }

    /// Add `value` to the cell at (row, column)
    #[inline]
    fn increment_by_value(&mut self, row: usize, column: usize, value: f64) {
        let current = self.value(row, column);
        self.set_value(row, column, current + value);
    }

    /// Logical contents in row-major order
    fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.size());
        for r in 0..self.rows() {
            for c in 0..self.columns() {
                out.push(self.value(r, c));
            }
        }
        out
    }
}
