//! Masking layer
//!
//! A [`Mask`] suppresses single cells, whole rows or whole columns of its
//! owning matrix. The three flag sets are independent and ORed: an element is
//! masked when its cell, its row or its column is set. Each set has its own
//! undo stack.
//!
//! Masks are addressed in the owner's *physical* coordinates. Matrices translate
//! logical coordinates through their transpose/slice view before reaching the
//! mask, so a row mask seen through a transposed view is the physical column
//! mask.

mod bits;
mod stack;

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::Rng;

pub use bits::MaskKind;
use bits::MaskBits;
use stack::MaskLayer;

use crate::error::{Error, Result};

/// Identifies one of the three mask stacks
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MaskStackKind {
    /// Cell mask stack
    Cell,
    /// Row mask stack
    Row,
    /// Column mask stack
    Column,
}

impl fmt::Display for MaskStackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell => f.write_str("Mask"),
            Self::Row => f.write_str("Row mask"),
            Self::Column => f.write_str("Column mask"),
        }
    }
}

/// Cell, row and column suppression flags with undo stacks
#[derive(Clone, Debug)]
pub struct Mask {
    rows: usize,
    columns: usize,
    kind: MaskKind,
    cells: MaskLayer,
    row_flags: MaskLayer,
    column_flags: MaskLayer,
}

impl Mask {
    /// Create an all-false mask
    pub fn new(kind: MaskKind, rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            kind,
            cells: MaskLayer::new(MaskBits::new(kind, rows * columns)),
            row_flags: MaskLayer::new(MaskBits::new(kind, rows)),
            column_flags: MaskLayer::new(MaskBits::new(kind, columns)),
        }
    }

    /// Dense mask
    pub fn dense(rows: usize, columns: usize) -> Self {
        Self::new(MaskKind::Dense, rows, columns)
    }

    /// Sparse mask
    pub fn sparse(rows: usize, columns: usize) -> Self {
        Self::new(MaskKind::Sparse, rows, columns)
    }

    /// Number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Storage strategy
    #[inline]
    pub fn kind(&self) -> MaskKind {
        self.kind
    }

    #[inline]
    fn cell_index(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }

    /// Cell flag at (row, column)
    #[inline]
    pub fn get(&self, row: usize, column: usize) -> bool {
        row < self.rows && column < self.columns && self.cells.bits().get(self.cell_index(row, column))
    }

    /// Set the cell flag at (row, column); out-of-range positions are ignored
    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: bool) {
        if row < self.rows && column < self.columns {
            let index = self.cell_index(row, column);
            self.cells.bits_mut().set(index, value);
        }
    }

    /// Row flag
    #[inline]
    pub fn row(&self, row: usize) -> bool {
        self.row_flags.bits().get(row)
    }

    /// Set the row flag
    #[inline]
    pub fn set_row(&mut self, row: usize, value: bool) {
        self.row_flags.bits_mut().set(row, value);
    }

    /// Column flag
    #[inline]
    pub fn column(&self, column: usize) -> bool {
        self.column_flags.bits().get(column)
    }

    /// Set the column flag
    #[inline]
    pub fn set_column(&mut self, column: usize, value: bool) {
        self.column_flags.bits_mut().set(column, value);
    }

    /// True when the cell, its row or its column is flagged
    #[inline]
    pub fn is_masked(&self, row: usize, column: usize) -> bool {
        self.row(row) || self.column(column) || self.get(row, column)
    }

    /// Number of cells suppressed for any reason
    pub fn masked_count(&self) -> usize {
        if !self.row_flags.bits().any() && !self.column_flags.bits().any() {
            return self.cells.bits().count();
        }
        (0..self.rows)
            .map(|r| (0..self.columns).filter(|&c| self.is_masked(r, c)).count())
            .sum()
    }

    fn layer_mut(&mut self, which: MaskStackKind) -> &mut MaskLayer {
        match which {
            MaskStackKind::Cell => &mut self.cells,
            MaskStackKind::Row => &mut self.row_flags,
            MaskStackKind::Column => &mut self.column_flags,
        }
    }

    fn layer(&self, which: MaskStackKind) -> &MaskLayer {
        match which {
            MaskStackKind::Cell => &self.cells,
            MaskStackKind::Row => &self.row_flags,
            MaskStackKind::Column => &self.column_flags,
        }
    }

    /// Push the current flags of `which`, optionally resetting them to all-false
    ///
    /// Without reset the saved entry aliases the live flags, so unstacking it
    /// keeps any edits made since.
    pub fn stack(&mut self, which: MaskStackKind, reset: bool) {
        tracing::trace!(?which, reset, "stacking mask");
        self.layer_mut(which).stack(reset);
    }

    /// Restore the most recently stacked flags of `which`
    pub fn unstack(&mut self, which: MaskStackKind) -> Result<()> {
        tracing::trace!(?which, "unstacking mask");
        self.layer_mut(which).unstack(which)
    }

    /// Depth of the `which` stack
    pub fn stack_len(&self, which: MaskStackKind) -> usize {
        self.layer(which).stack_len()
    }

    /// Drop every saved entry of the `which` stack, leaving current flags alone
    pub fn clear_stack(&mut self, which: MaskStackKind) {
        self.layer_mut(which).clear_stack();
    }

    /// Reset cell, row and column flags to all-false
    pub fn clear(&mut self) {
        self.cells.clear();
        self.row_flags.clear();
        self.column_flags.clear();
    }

    /// Transposed copy of the current flags, without stacks
    pub fn transpose(&self) -> Mask {
        let mut result = Mask::new(self.kind, self.columns, self.rows);
        for r in 0..self.rows {
            if self.row(r) {
                result.set_column(r, true);
            }
            for c in 0..self.columns {
                if self.get(r, c) {
                    result.set(c, r, true);
                }
            }
        }
        for c in 0..self.columns {
            if self.column(c) {
                result.set_row(c, true);
            }
        }
        result
    }

    /// Flag each cell independently with probability `probability`
    pub fn mask_by_probability<R: Rng + ?Sized>(&mut self, probability: f64, rng: &mut R) -> Result<()> {
        validate_probability(probability)?;
        for r in 0..self.rows {
            for c in 0..self.columns {
                if rng.random::<f64>() < probability {
                    self.set(r, c, true);
                }
            }
        }
        Ok(())
    }

    /// Flag each row independently with probability `probability`
    pub fn mask_row_by_probability<R: Rng + ?Sized>(&mut self, probability: f64, rng: &mut R) -> Result<()> {
        validate_probability(probability)?;
        for r in 0..self.rows {
            if rng.random::<f64>() < probability {
                self.set_row(r, true);
            }
        }
        Ok(())
    }

    /// Flag each column independently with probability `probability`
    pub fn mask_column_by_probability<R: Rng + ?Sized>(
        &mut self,
        probability: f64,
        rng: &mut R,
    ) -> Result<()> {
        validate_probability(probability)?;
        for c in 0..self.columns {
            if rng.random::<f64>() < probability {
                self.set_column(c, true);
            }
        }
        Ok(())
    }
}

fn validate_probability(probability: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(Error::invalid_argument(
            "probability",
            format!("must be between 0 and 1, got {probability}"),
        ));
    }
    Ok(())
}

/// Mask shared between a matrix and its references
///
/// Cloning the handle aliases the same mask; [`SharedMask::deep_copy`] detaches.
#[derive(Clone)]
pub struct SharedMask(Arc<RwLock<Mask>>);

impl SharedMask {
    /// Wrap a mask
    pub fn new(mask: Mask) -> Self {
        Self(Arc::new(RwLock::new(mask)))
    }

    /// Shared access
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Mask> {
        self.0.read()
    }

    /// Exclusive access
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Mask> {
        self.0.write()
    }

    /// Independent handle holding a clone of the mask
    pub fn deep_copy(&self) -> Self {
        Self::new(self.read().clone())
    }

    /// True when both handles alias the same mask
    pub fn ptr_eq(&self, other: &SharedMask) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = self.read();
        f.debug_struct("SharedMask")
            .field("rows", &mask.rows)
            .field("columns", &mask.columns)
            .field("kind", &mask.kind)
            .finish()
    }
}
