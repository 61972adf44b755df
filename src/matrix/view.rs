//! Logical to physical coordinate translation
//!
//! A view is applied in two steps: the slice offset moves a logical coordinate
//! into the oriented matrix, then the transpose flag swaps it into storage
//! order. Values and masks go through the same translation.

use crate::mask::MaskStackKind;

/// Physical axis a logical row or column lands on
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Axis {
    Row(usize),
    Column(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct View {
    pub(crate) rows: usize,
    pub(crate) columns: usize,
    row_offset: usize,
    column_offset: usize,
    pub(crate) transposed: bool,
}

impl View {
    pub(crate) fn full(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            row_offset: 0,
            column_offset: 0,
            transposed: false,
        }
    }

    #[inline]
    pub(crate) fn physical(&self, row: usize, column: usize) -> (usize, usize) {
        let (r, c) = (row + self.row_offset, column + self.column_offset);
        if self.transposed { (c, r) } else { (r, c) }
    }

    #[inline]
    pub(crate) fn row_axis(&self, row: usize) -> Axis {
        let r = row + self.row_offset;
        if self.transposed {
            Axis::Column(r)
        } else {
            Axis::Row(r)
        }
    }

    #[inline]
    pub(crate) fn column_axis(&self, column: usize) -> Axis {
        let c = column + self.column_offset;
        if self.transposed {
            Axis::Row(c)
        } else {
            Axis::Column(c)
        }
    }

    /// Physical stack behind a logical stack kind
    pub(crate) fn stack_kind(&self, which: MaskStackKind) -> MaskStackKind {
        match (which, self.transposed) {
            (MaskStackKind::Row, true) => MaskStackKind::Column,
            (MaskStackKind::Column, true) => MaskStackKind::Row,
            (kind, _) => kind,
        }
    }

    pub(crate) fn transpose(&self) -> Self {
        Self {
            rows: self.columns,
            columns: self.rows,
            row_offset: self.column_offset,
            column_offset: self.row_offset,
            transposed: !self.transposed,
        }
    }

    pub(crate) fn slice(&self, row: usize, column: usize, rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            row_offset: self.row_offset + row,
            column_offset: self.column_offset + column,
            transposed: self.transposed,
        }
    }

    pub(crate) fn is_full(&self, physical_rows: usize, physical_columns: usize) -> bool {
        let (rows, columns) = if self.transposed {
            (physical_columns, physical_rows)
        } else {
            (physical_rows, physical_columns)
        };
        self.row_offset == 0 && self.column_offset == 0 && self.rows == rows && self.columns == columns
    }
}
