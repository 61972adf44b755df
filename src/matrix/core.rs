//! State shared by every matrix kind

use crate::error::{Error, Result};
use crate::mask::{Mask, MaskKind, MaskStackKind, SharedMask};
use crate::recorder::RecorderHandle;

use super::id::MatrixId;
use super::view::{Axis, View};

/// View, mask, recorder and identity of a matrix handle
///
/// Cloning yields a handle aliasing the same mask and recorder.
#[derive(Clone)]
pub(crate) struct MatrixCore {
    pub(crate) view: View,
    pub(crate) scalar: bool,
    pub(crate) physical_rows: usize,
    pub(crate) physical_columns: usize,
    pub(crate) mask: Option<SharedMask>,
    pub(crate) recorder: Option<RecorderHandle>,
    pub(crate) name: Option<String>,
    pub(crate) id: MatrixId,
}

impl MatrixCore {
    pub(crate) fn new(rows: usize, columns: usize, scalar: bool) -> Self {
        Self {
            view: View::full(rows, columns),
            scalar,
            physical_rows: rows,
            physical_columns: columns,
            mask: None,
            recorder: None,
            name: None,
            id: MatrixId::new(),
        }
    }

    #[inline]
    pub(crate) fn rows(&self) -> usize {
        if self.scalar { 1 } else { self.view.rows }
    }

    #[inline]
    pub(crate) fn columns(&self) -> usize {
        if self.scalar { 1 } else { self.view.columns }
    }

    #[inline]
    pub(crate) fn physical(&self, row: usize, column: usize) -> (usize, usize) {
        if self.scalar {
            (0, 0)
        } else {
            self.view.physical(row, column)
        }
    }

    /// Linear storage index of a logical coordinate, `None` outside storage
    #[inline]
    pub(crate) fn storage_index(&self, row: usize, column: usize) -> Option<usize> {
        let (r, c) = self.physical(row, column);
        (r < self.physical_rows && c < self.physical_columns).then(|| r * self.physical_columns + c)
    }

    /// Same handle state, fresh identity, detached mask copy
    pub(crate) fn deep_copy(&self) -> Self {
        Self {
            mask: self.mask.as_ref().map(SharedMask::deep_copy),
            id: MatrixId::new(),
            ..self.clone()
        }
    }

    pub(crate) fn transposed(&self) -> Self {
        if self.scalar {
            return self.clone();
        }
        Self {
            view: self.view.transpose(),
            ..self.clone()
        }
    }

    pub(crate) fn sliced(&self, row: usize, column: usize, rows: usize, columns: usize) -> Result<Self> {
        if row + rows > self.rows() || column + columns > self.columns() {
            tracing::debug!(row, column, rows, columns, "slice outside matrix");
            let (index, size) = if row + rows > self.rows() {
                (row + rows, self.rows())
            } else {
                (column + columns, self.columns())
            };
            return Err(Error::IndexOutOfBounds { index, size });
        }
        Ok(Self {
            view: self.view.slice(row, column, rows, columns),
            ..self.clone()
        })
    }

    // ------------------------------------------------------------------
    // Masking
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    #[inline]
    pub(crate) fn is_masked(&self, row: usize, column: usize) -> bool {
        match &self.mask {
            None => false,
            Some(mask) => {
                let (r, c) = self.physical(row, column);
                mask.read().is_masked(r, c)
            }
        }
    }

    pub(crate) fn set_mask(&mut self, mask: SharedMask) -> Result<()> {
        let (rows, columns) = {
            let m = mask.read();
            (m.rows(), m.columns())
        };
        if rows != self.physical_rows || columns != self.physical_columns {
            tracing::debug!(rows, columns, "mask does not match matrix storage");
            return Err(Error::incompatible_dimensions(
                "set_mask",
                [self.physical_rows, self.physical_columns],
                [rows, columns],
            ));
        }
        self.mask = Some(mask);
        Ok(())
    }

    pub(crate) fn ensure_mask(&mut self, kind: MaskKind) -> SharedMask {
        let (rows, columns) = (self.physical_rows, self.physical_columns);
        self.mask
            .get_or_insert_with(|| SharedMask::new(Mask::new(kind, rows, columns)))
            .clone()
    }

    pub(crate) fn set_mask_at(&mut self, kind: MaskKind, row: usize, column: usize, value: bool) {
        let (r, c) = self.physical(row, column);
        self.ensure_mask(kind).write().set(r, c, value);
    }

    pub(crate) fn mask_at(&self, row: usize, column: usize) -> bool {
        let (r, c) = self.physical(row, column);
        self.mask.as_ref().is_some_and(|m| m.read().get(r, c))
    }

    fn set_axis(&mut self, kind: MaskKind, axis: Axis, value: bool) {
        let mask = self.ensure_mask(kind);
        let mut mask = mask.write();
        match axis {
            Axis::Row(r) => mask.set_row(r, value),
            Axis::Column(c) => mask.set_column(c, value),
        }
    }

    fn axis(&self, axis: Axis) -> bool {
        self.mask.as_ref().is_some_and(|m| {
            let m = m.read();
            match axis {
                Axis::Row(r) => m.row(r),
                Axis::Column(c) => m.column(c),
            }
        })
    }

    pub(crate) fn set_row_mask_at(&mut self, kind: MaskKind, row: usize, value: bool) {
        let axis = self.row_axis(row);
        self.set_axis(kind, axis, value);
    }

    pub(crate) fn row_mask_at(&self, row: usize) -> bool {
        self.axis(self.row_axis(row))
    }

    pub(crate) fn set_column_mask_at(&mut self, kind: MaskKind, column: usize, value: bool) {
        let axis = self.column_axis(column);
        self.set_axis(kind, axis, value);
    }

    pub(crate) fn column_mask_at(&self, column: usize) -> bool {
        self.axis(self.column_axis(column))
    }

    #[inline]
    fn row_axis(&self, row: usize) -> Axis {
        if self.scalar {
            Axis::Row(0)
        } else {
            self.view.row_axis(row)
        }
    }

    #[inline]
    fn column_axis(&self, column: usize) -> Axis {
        if self.scalar {
            Axis::Column(0)
        } else {
            self.view.column_axis(column)
        }
    }

    pub(crate) fn stack(&mut self, kind: MaskKind, which: MaskStackKind, reset: bool) {
        let which = self.view.stack_kind(which);
        self.ensure_mask(kind).write().stack(which, reset);
    }

    pub(crate) fn unstack(&mut self, which: MaskStackKind) -> Result<()> {
        let physical = self.view.stack_kind(which);
        match &self.mask {
            Some(mask) => mask.write().unstack(physical).map_err(|_| Error::StackEmpty { stack: which }),
            None => Err(Error::StackEmpty { stack: which }),
        }
    }

    pub(crate) fn stack_len(&self, which: MaskStackKind) -> usize {
        let which = self.view.stack_kind(which);
        self.mask.as_ref().map_or(0, |m| m.read().stack_len(which))
    }

    pub(crate) fn clear_stack(&mut self, which: MaskStackKind) {
        let which = self.view.stack_kind(which);
        if let Some(mask) = &self.mask {
            mask.write().clear_stack(which);
        }
    }

    pub(crate) fn clear_mask(&mut self) {
        if let Some(mask) = &self.mask {
            mask.write().clear();
        }
    }
}
