//! Matrix kinds and the shared matrix contract
//!
//! [`Matrix`] is the currency of every operation. It wraps one of the concrete
//! kinds:
//!
//! - [`DenseMatrix`]: row-major array, the correctness baseline
//! - [`SparseMatrix`]: hash map of non-zero entries (feature `sparse`)
//! - [`JoinedMatrix`]: parts concatenated along one axis, read through
//!
//! Values are filled through [`Matrix::initialize`] with one of the
//! [`Initialization`] kinds.
//!
//! All kinds implement [`MatrixStorage`]; operations in [`crate::ops`] are
//! written once against it, so masking and broadcasting behave identically
//! for every kind.
//!
//! # Sharing
//!
//! [`Matrix::reference`] returns a handle aliasing storage and mask; writes
//! through either handle are visible through both. [`Matrix::copy`] is fully
//! independent. Transposed and sliced views are references. A mask attached
//! lazily through one handle is only visible to handles taken afterwards;
//! call [`Matrix::ensure_mask`] first to share it. Matrices are
//! `Send + Sync`, but concurrent writes to aliased storage are not ordered;
//! synchronize externally or work on copies.

mod core;
mod dense;
mod factory;
mod id;
mod init;
mod joined;
#[cfg(feature = "sparse")]
mod sparse;
mod storage;
mod view;

use std::fmt;

use rand::Rng;

pub use dense::DenseMatrix;
pub use factory::MatrixFactory;
pub use id::MatrixId;
pub use init::{ConvolutionFans, Initialization};
pub use joined::{JoinDirection, JoinedMatrix};
#[cfg(feature = "sparse")]
pub use sparse::SparseMatrix;
pub use storage::MatrixStorage;

use self::core::MatrixCore;
use crate::error::{Error, Result, check_index};
use crate::mask::{Mask, MaskKind, MaskStackKind, SharedMask};
use crate::recorder::RecorderHandle;

/// Dispatch `$body` over every matrix kind with `$m` bound to the inner value
macro_rules! dispatch {
    ($matrix:expr, $m:ident => $body:expr) => {
        match $matrix {
            Matrix::Dense($m) => $body,
            #[cfg(feature = "sparse")]
            Matrix::Sparse($m) => $body,
            Matrix::Joined($m) => $body,
        }
    };
}

/// Storage kind of a matrix
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    /// Array backed
    Dense,
    /// Hash-map backed
    Sparse,
    /// Composite of parts
    Joined,
}

/// A dense, sparse or joined matrix
pub enum Matrix {
    /// Array-backed storage
    Dense(DenseMatrix),
    /// Hash-map backed storage
    #[cfg(feature = "sparse")]
    Sparse(SparseMatrix),
    /// Parts concatenated along one axis
    Joined(JoinedMatrix),
}

impl Matrix {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Zeroed dense matrix
    pub fn dense(rows: usize, columns: usize) -> Self {
        DenseMatrix::new(rows, columns).into()
    }

    /// Empty sparse matrix
    #[cfg(feature = "sparse")]
    pub fn sparse(rows: usize, columns: usize) -> Self {
        SparseMatrix::new(rows, columns).into()
    }

    /// Dense scalar (1x1, broadcasting) matrix
    pub fn scalar(value: f64) -> Self {
        DenseMatrix::scalar(value).into()
    }

    /// Dense matrix from nested rows
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        DenseMatrix::from_rows(rows).map(Into::into)
    }

    /// Dense column vector
    pub fn column(values: &[f64]) -> Self {
        DenseMatrix::column(values).into()
    }

    /// Join matrices along `direction` without copying
    ///
    /// The composite holds references to `parts`.
    pub fn join(parts: &[&Matrix], direction: JoinDirection) -> Result<Self> {
        let parts = parts.iter().map(|m| m.reference()).collect();
        JoinedMatrix::new(parts, direction).map(Into::into)
    }

    // ========================================================================
    // Identity and kind
    // ========================================================================

    /// Storage kind
    pub fn kind(&self) -> MatrixKind {
        match self {
            Matrix::Dense(_) => MatrixKind::Dense,
            #[cfg(feature = "sparse")]
            Matrix::Sparse(_) => MatrixKind::Sparse,
            Matrix::Joined(_) => MatrixKind::Joined,
        }
    }

    /// Identity shared by all references to the same storage
    pub fn id(&self) -> MatrixId {
        self.core().id
    }

    pub(crate) fn core(&self) -> &MatrixCore {
        dispatch!(self, m => &m.core)
    }

    pub(crate) fn core_mut(&mut self) -> &mut MatrixCore {
        dispatch!(self, m => &mut m.core)
    }

    fn mask_kind(&self) -> MaskKind {
        match self {
            #[cfg(feature = "sparse")]
            Matrix::Sparse(_) => SparseMatrix::MASK_KIND,
            _ => DenseMatrix::MASK_KIND,
        }
    }

    /// Inner dense matrix
    pub fn as_dense(&self) -> Option<&DenseMatrix> {
        match self {
            Matrix::Dense(m) => Some(m),
            _ => None,
        }
    }

    /// Inner sparse matrix
    #[cfg(feature = "sparse")]
    pub fn as_sparse(&self) -> Option<&SparseMatrix> {
        match self {
            Matrix::Sparse(m) => Some(m),
            _ => None,
        }
    }

    /// Inner joined matrix
    pub fn as_joined(&self) -> Option<&JoinedMatrix> {
        match self {
            Matrix::Joined(m) => Some(m),
            _ => None,
        }
    }

    /// Parts of a joined matrix, or `None` for other kinds
    pub fn into_parts(self) -> Option<Vec<Matrix>> {
        match self {
            Matrix::Joined(m) => Some(m.into_parts()),
            _ => None,
        }
    }

    /// Name used in debugging output and by recorders
    pub fn name(&self) -> Option<&str> {
        self.core().name.as_deref()
    }

    /// Set the name of this handle
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.core_mut().name = Some(name.into());
    }

    /// Attached expression recorder
    pub fn recorder(&self) -> Option<&RecorderHandle> {
        self.core().recorder.as_ref()
    }

    /// Attach or detach an expression recorder
    pub fn set_recorder(&mut self, recorder: Option<RecorderHandle>) {
        self.core_mut().recorder = recorder;
    }

    // ========================================================================
    // Checked element access
    // ========================================================================

    /// Value at (row, column), bounds checked
    pub fn get(&self, row: usize, column: usize) -> Result<f64> {
        self.check_bounds(row, column)?;
        Ok(self.value(row, column))
    }

    /// Write the value at (row, column), bounds checked
    pub fn set(&mut self, row: usize, column: usize, value: f64) -> Result<()> {
        self.check_bounds(row, column)?;
        self.set_value(row, column, value);
        Ok(())
    }

    fn check_bounds(&self, row: usize, column: usize) -> Result<()> {
        check_index(row, self.rows())?;
        check_index(column, self.columns())
    }

    // ========================================================================
    // Sharing and views
    // ========================================================================

    /// Handle sharing storage and mask with `self`
    pub fn reference(&self) -> Matrix {
        match self {
            Matrix::Dense(m) => Matrix::Dense(m.reference()),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) => Matrix::Sparse(m.reference()),
            Matrix::Joined(m) => Matrix::Joined(m.reference()),
        }
    }

    /// Reference without the recorder attached
    pub(crate) fn detached_reference(&self) -> Matrix {
        let mut reference = self.reference();
        reference.set_recorder(None);
        reference
    }

    /// Fully independent copy including the mask
    pub fn copy(&self) -> Matrix {
        match self {
            Matrix::Dense(m) => Matrix::Dense(m.copy()),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) => Matrix::Sparse(m.copy()),
            Matrix::Joined(m) => Matrix::Joined(m.copy()),
        }
    }

    /// True when both handles alias the same storage
    pub fn shares_storage(&self, other: &Matrix) -> bool {
        match (self, other) {
            (Matrix::Dense(a), Matrix::Dense(b)) => a.shares_storage(b),
            #[cfg(feature = "sparse")]
            (Matrix::Sparse(a), Matrix::Sparse(b)) => a.shares_storage(b),
            (Matrix::Joined(a), Matrix::Joined(b)) => {
                a.part_count() == b.part_count()
                    && a.parts()
                        .iter()
                        .zip(b.parts())
                        .all(|(x, y)| x.shares_storage(y))
            }
            _ => false,
        }
    }

    /// Transposed view sharing storage and mask
    ///
    /// A joined matrix flips its join direction and transposes every part.
    pub fn transpose(&self) -> Matrix {
        match self {
            Matrix::Dense(m) => Matrix::Dense(m.with_view_core(m.core.transposed())),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) => Matrix::Sparse(m.with_view_core(m.core.transposed())),
            Matrix::Joined(m) => Matrix::Joined(m.transpose()),
        }
    }

    /// True when this handle is a transposed view
    pub fn is_transposed(&self) -> bool {
        self.core().view.transposed
    }

    /// Sub-rectangle view sharing storage and mask
    pub fn slice(&self, row: usize, column: usize, rows: usize, columns: usize) -> Result<Matrix> {
        match self {
            Matrix::Dense(m) => Ok(Matrix::Dense(
                m.with_view_core(m.core.sliced(row, column, rows, columns)?),
            )),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) => Ok(Matrix::Sparse(
                m.with_view_core(m.core.sliced(row, column, rows, columns)?),
            )),
            Matrix::Joined(_) => Err(Error::illegal_operation(
                "slice",
                "joined matrix cannot be sliced",
            )),
        }
    }

    /// New matrix of the same kind with the given shape, filled in row-major order
    pub fn redimension(&self, rows: usize, columns: usize) -> Result<Matrix> {
        if let Matrix::Joined(_) = self {
            return Err(Error::illegal_operation(
                "redimension",
                "joined matrix cannot be redimensioned",
            ));
        }
        if rows * columns != self.size() {
            return Err(Error::incompatible_dimensions(
                "redimension",
                self.shape(),
                [rows, columns],
            ));
        }
        let values = self.to_vec();
        match self {
            #[cfg(feature = "sparse")]
            Matrix::Sparse(_) => SparseMatrix::from_vec(rows, columns, &values).map(Into::into),
            _ => {
                let mut core = MatrixCore::new(rows, columns, false);
                core.recorder = self.core().recorder.clone();
                Ok(DenseMatrix::with_core(core, values).into())
            }
        }
    }

    /// Zero every value and drop the mask
    pub fn reset(&mut self) {
        match self {
            Matrix::Dense(m) => m.fill_zero(),
            #[cfg(feature = "sparse")]
            Matrix::Sparse(m) => m.fill_zero(),
            Matrix::Joined(m) => m.fill_zero(),
        }
        self.core_mut().mask = None;
    }

    /// Cell-by-cell comparison within `tolerance`
    ///
    /// Two joined matrices with the same layout compare part by part.
    pub fn equals(&self, other: &Matrix, tolerance: f64) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        if let (Matrix::Joined(a), Matrix::Joined(b)) = (self, other) {
            if let Some(equal) = a.equals_parts(b, tolerance) {
                return equal;
            }
        }
        (0..self.rows()).all(|r| {
            (0..self.columns()).all(|c| (self.value(r, c) - other.value(r, c)).abs() <= tolerance)
        })
    }

    // ========================================================================
    // Masking
    // ========================================================================

    /// Attached mask handle
    pub fn mask(&self) -> Option<SharedMask> {
        self.core().mask.clone()
    }

    /// Attach `mask`; its shape must equal the storage shape
    pub fn set_mask(&mut self, mask: Mask) -> Result<()> {
        self.core_mut().set_mask(SharedMask::new(mask))
    }

    /// Attach a shared mask handle; its shape must equal the storage shape
    pub fn set_shared_mask(&mut self, mask: SharedMask) -> Result<()> {
        self.core_mut().set_mask(mask)
    }

    /// Detach the mask
    pub fn remove_mask(&mut self) {
        self.core_mut().mask = None;
    }

    /// Attached mask, created all-false if missing
    pub fn ensure_mask(&mut self) -> SharedMask {
        let kind = self.mask_kind();
        self.core_mut().ensure_mask(kind)
    }

    /// Set the cell mask at (row, column)
    pub fn set_mask_at(&mut self, row: usize, column: usize, value: bool) {
        let kind = self.mask_kind();
        self.core_mut().set_mask_at(kind, row, column, value);
    }

    /// Cell mask at (row, column)
    pub fn mask_at(&self, row: usize, column: usize) -> bool {
        self.core().mask_at(row, column)
    }

    /// Set the mask of a whole row
    pub fn set_row_mask_at(&mut self, row: usize, value: bool) {
        let kind = self.mask_kind();
        self.core_mut().set_row_mask_at(kind, row, value);
    }

    /// Row mask at `row`
    pub fn row_mask_at(&self, row: usize) -> bool {
        self.core().row_mask_at(row)
    }

    /// Set the mask of a whole column
    pub fn set_column_mask_at(&mut self, column: usize, value: bool) {
        let kind = self.mask_kind();
        self.core_mut().set_column_mask_at(kind, column, value);
    }

    /// Column mask at `column`
    pub fn column_mask_at(&self, column: usize) -> bool {
        self.core().column_mask_at(column)
    }

    /// Push the cell mask, resetting it to all-false when `reset`
    pub fn stack_mask(&mut self, reset: bool) {
        let kind = self.mask_kind();
        self.core_mut().stack(kind, MaskStackKind::Cell, reset);
    }

    /// Restore the last pushed cell mask
    pub fn unstack_mask(&mut self) -> Result<()> {
        self.core_mut().unstack(MaskStackKind::Cell)
    }

    /// Push the row mask, resetting it to all-false when `reset`
    pub fn stack_row_mask(&mut self, reset: bool) {
        let kind = self.mask_kind();
        self.core_mut().stack(kind, MaskStackKind::Row, reset);
    }

    /// Restore the last pushed row mask
    pub fn unstack_row_mask(&mut self) -> Result<()> {
        self.core_mut().unstack(MaskStackKind::Row)
    }

    /// Push the column mask, resetting it to all-false when `reset`
    pub fn stack_column_mask(&mut self, reset: bool) {
        let kind = self.mask_kind();
        self.core_mut().stack(kind, MaskStackKind::Column, reset);
    }

    /// Restore the last pushed column mask
    pub fn unstack_column_mask(&mut self) -> Result<()> {
        self.core_mut().unstack(MaskStackKind::Column)
    }

    /// Depth of a mask stack as seen through this view
    pub fn mask_stack_len(&self, which: MaskStackKind) -> usize {
        self.core().stack_len(which)
    }

    /// Drop the saved entries of a mask stack
    pub fn clear_mask_stack(&mut self, which: MaskStackKind) {
        self.core_mut().clear_stack(which);
    }

    /// Reset every cell, row and column flag to false
    pub fn clear_mask(&mut self) {
        self.core_mut().clear_mask();
    }

    /// Mask each stored cell with probability `probability`
    pub fn mask_by_probability(&mut self, probability: f64) -> Result<()> {
        self.mask_by_probability_with_rng(probability, &mut rand::rng())
    }

    /// [`Matrix::mask_by_probability`] with a caller supplied generator
    pub fn mask_by_probability_with_rng<R: Rng + ?Sized>(&mut self, probability: f64, rng: &mut R) -> Result<()> {
        self.ensure_mask().write().mask_by_probability(probability, rng)
    }

    /// Mask each stored row with probability `probability`
    pub fn mask_row_by_probability(&mut self, probability: f64) -> Result<()> {
        self.mask_row_by_probability_with_rng(probability, &mut rand::rng())
    }

    /// Mask each stored column with probability `probability`
    pub fn mask_column_by_probability(&mut self, probability: f64) -> Result<()> {
        self.mask_column_by_probability_with_rng(probability, &mut rand::rng())
    }

    /// [`Matrix::mask_row_by_probability`] with a caller supplied generator
    pub fn mask_row_by_probability_with_rng<R: Rng + ?Sized>(
        &mut self,
        probability: f64,
        rng: &mut R,
    ) -> Result<()> {
        self.ensure_mask().write().mask_row_by_probability(probability, rng)
    }

    /// [`Matrix::mask_column_by_probability`] with a caller supplied generator
    pub fn mask_column_by_probability_with_rng<R: Rng + ?Sized>(
        &mut self,
        probability: f64,
        rng: &mut R,
    ) -> Result<()> {
        self.ensure_mask().write().mask_column_by_probability(probability, rng)
    }
}

impl MatrixStorage for Matrix {
    #[inline]
    fn rows(&self) -> usize {
        dispatch!(self, m => m.rows())
    }

    #[inline]
    fn columns(&self) -> usize {
        dispatch!(self, m => m.columns())
    }

    #[inline]
    fn is_scalar(&self) -> bool {
        dispatch!(self, m => m.is_scalar())
    }

    #[inline]
    fn value(&self, row: usize, column: usize) -> f64 {
        dispatch!(self, m => m.value(row, column))
    }

    #[inline]
    fn set_value(&mut self, row: usize, column: usize, value: f64) {
        dispatch!(self, m => m.set_value(row, column, value))
    }

    #[inline]
    fn is_masked(&self, row: usize, column: usize) -> bool {
        dispatch!(self, m => m.is_masked(row, column))
    }

    #[inline]
    fn has_mask(&self) -> bool {
        dispatch!(self, m => m.has_mask())
    }
}

impl From<DenseMatrix> for Matrix {
    fn from(m: DenseMatrix) -> Self {
        Matrix::Dense(m)
    }
}

#[cfg(feature = "sparse")]
impl From<SparseMatrix> for Matrix {
    fn from(m: SparseMatrix) -> Self {
        Matrix::Sparse(m)
    }
}

impl From<JoinedMatrix> for Matrix {
    fn from(m: JoinedMatrix) -> Self {
        Matrix::Joined(m)
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, 0.0)
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, m => m.fmt(f))
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            writeln!(f, "{name}:")?;
        }
        for r in 0..self.rows() {
            let row: Vec<String> = (0..self.columns())
                .map(|c| format!("{}", self.value(r, c)))
                .collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap()
    }

    #[test]
    fn test_checked_access() {
        let mut m = sample();
        assert_eq!(m.get(1, 2).unwrap(), 6.0);
        assert_eq!(
            m.get(2, 0).unwrap_err(),
            Error::IndexOutOfBounds { index: 2, size: 2 }
        );
        assert!(m.set(0, 3, 1.0).is_err());
        m.set(0, 0, 10.0).unwrap();
        assert_eq!(m.value(0, 0), 10.0);
    }

    #[test]
    fn test_transpose_is_a_view() {
        let m = sample();
        let mut t = m.transpose();
        assert_eq!(t.shape(), [3, 2]);
        assert_eq!(t.value(2, 1), 6.0);
        t.set_value(0, 1, 40.0);
        assert_eq!(m.value(1, 0), 40.0);
        assert!(t.shares_storage(&m));
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn test_slice_is_a_view() {
        let m = sample();
        let mut s = m.slice(0, 1, 2, 2).unwrap();
        assert_eq!(s.to_vec(), vec![2.0, 3.0, 5.0, 6.0]);
        s.set_value(1, 1, 0.5);
        assert_eq!(m.value(1, 2), 0.5);
        assert!(matches!(
            m.slice(1, 0, 2, 1),
            Err(Error::IndexOutOfBounds { index: 3, size: 2 })
        ));
    }

    #[test]
    fn test_copy_is_independent_including_mask() {
        let mut m = sample();
        m.set_mask_at(0, 0, true);
        let mut copy = m.copy();
        copy.set_mask_at(1, 1, true);
        copy.set_value(0, 2, 0.0);
        assert!(!m.mask_at(1, 1));
        assert_eq!(m.value(0, 2), 3.0);
        assert!(copy.mask_at(0, 0));
        assert_ne!(copy.id(), m.id());
        assert_eq!(m.reference().id(), m.id());
    }

    #[test]
    fn test_row_mask_through_transpose() {
        let mut m = sample();
        m.ensure_mask();
        let mut t = m.transpose();
        t.set_row_mask_at(2, true);
        // logical row 2 of the transpose is storage column 2
        assert!(m.column_mask_at(2));
        assert!(m.is_masked(0, 2));
        assert!(t.is_masked(2, 0));
        assert!(!t.is_masked(1, 0));
    }

    #[test]
    fn test_mask_stack_round_trip() {
        let mut m = sample();
        m.set_mask_at(0, 1, true);
        let before = m.mask().unwrap().read().clone();
        m.stack_mask(true);
        m.set_mask_at(1, 1, true);
        assert!(!m.mask_at(0, 1));
        m.unstack_mask().unwrap();
        let after = m.mask().unwrap();
        for r in 0..2 {
            for c in 0..3 {
                assert_eq!(after.read().get(r, c), before.get(r, c));
            }
        }
        assert_eq!(
            m.unstack_mask().unwrap_err(),
            Error::StackEmpty {
                stack: MaskStackKind::Cell
            }
        );
    }

    #[test]
    fn test_unstack_without_mask() {
        let mut m = sample();
        assert_eq!(
            m.unstack_row_mask().unwrap_err(),
            Error::StackEmpty {
                stack: MaskStackKind::Row
            }
        );
    }

    #[test]
    fn test_set_mask_validates_shape() {
        let mut m = sample();
        assert!(matches!(
            m.set_mask(Mask::dense(3, 2)),
            Err(Error::IncompatibleDimensions { op: "set_mask", .. })
        ));
        m.set_mask(Mask::dense(2, 3)).unwrap();
        assert!(m.has_mask());
    }

    #[test]
    fn test_reset_drops_mask_and_values() {
        let mut m = sample();
        m.set_mask_at(0, 0, true);
        m.reset();
        assert!(!m.has_mask());
        assert!(m.to_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_joined_cannot_be_sliced_or_redimensioned() {
        let a = sample();
        let b = sample();
        let joined = Matrix::join(&[&a, &b], JoinDirection::Horizontal).unwrap();
        assert_eq!(joined.shape(), [2, 6]);
        assert!(matches!(
            joined.slice(0, 0, 1, 1),
            Err(Error::IllegalOperation { op: "slice", .. })
        ));
        assert!(matches!(
            joined.redimension(3, 4),
            Err(Error::IllegalOperation { .. })
        ));
    }

    #[test]
    fn test_redimension() {
        let m = sample();
        let r = m.redimension(3, 2).unwrap();
        assert_eq!(r.to_vec(), m.to_vec());
        assert_eq!(r.shape(), [3, 2]);
        assert!(m.redimension(4, 2).is_err());
    }

    #[test]
    fn test_joined_equality_part_by_part() {
        let a = sample();
        let b = sample();
        let j1 = Matrix::join(&[&a, &b], JoinDirection::Vertical).unwrap();
        let j2 = Matrix::join(&[&a.copy(), &b.copy()], JoinDirection::Vertical).unwrap();
        assert_eq!(j1, j2);
        let flat = Matrix::from_rows(&[
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
        ])
        .unwrap();
        assert!(j1.equals(&flat, 0.0));
    }
}
