//! Array-backed matrix

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::core::MatrixCore;
use super::storage::MatrixStorage;
use crate::error::{Error, Result};
use crate::mask::MaskKind;

/// Row-major `Vec<f64>` storage shared between references
pub struct DenseMatrix {
    pub(crate) core: MatrixCore,
    data: Arc<RwLock<Vec<f64>>>,
}

impl DenseMatrix {
    /// Zero-filled matrix
    pub fn new(rows: usize, columns: usize) -> Self {
        Self::constant(rows, columns, 0.0)
    }

    /// Matrix with every cell set to `value`
    pub fn constant(rows: usize, columns: usize, value: f64) -> Self {
        Self {
            core: MatrixCore::new(rows, columns, false),
            data: Arc::new(RwLock::new(vec![value; rows * columns])),
        }
    }

    /// 1x1 matrix that broadcasts against any shape
    pub fn scalar(value: f64) -> Self {
        Self {
            core: MatrixCore::new(1, 1, true),
            data: Arc::new(RwLock::new(vec![value])),
        }
    }

    /// Build from row-major data
    pub fn from_vec(rows: usize, columns: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * columns {
            return Err(Error::invalid_argument(
                "data",
                format!(
                    "expected {} values for a {}x{} matrix, got {}",
                    rows * columns,
                    rows,
                    columns,
                    data.len()
                ),
            ));
        }
        Ok(Self {
            core: MatrixCore::new(rows, columns, false),
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Build from nested rows; every row must have the same length
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let columns = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * columns);
        for (index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != columns {
                return Err(Error::invalid_argument(
                    "rows",
                    format!("row {index} has {} columns, expected {columns}", row.len()),
                ));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(rows.len(), columns, data)
    }

    /// Column vector from values
    pub fn column(values: &[f64]) -> Self {
        Self {
            core: MatrixCore::new(values.len(), 1, false),
            data: Arc::new(RwLock::new(values.to_vec())),
        }
    }

    pub(crate) fn with_core(core: MatrixCore, data: Vec<f64>) -> Self {
        Self {
            core,
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Handle sharing storage and mask
    pub(crate) fn reference(&self) -> Self {
        Self {
            core: self.core.clone(),
            data: Arc::clone(&self.data),
        }
    }

    /// Independent copy of storage and mask, keeping the current view
    pub(crate) fn copy(&self) -> Self {
        Self {
            core: self.core.deep_copy(),
            data: Arc::new(RwLock::new(self.data.read().clone())),
        }
    }

    pub(crate) fn with_view_core(&self, core: MatrixCore) -> Self {
        Self {
            core,
            data: Arc::clone(&self.data),
        }
    }

    pub(crate) fn shares_storage(&self, other: &DenseMatrix) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) const MASK_KIND: MaskKind = MaskKind::Dense;

    /// Zero every cell
    pub(crate) fn fill_zero(&mut self) {
        if self.core.view.is_full(self.core.physical_rows, self.core.physical_columns) || self.core.scalar {
            self.data.write().iter_mut().for_each(|v| *v = 0.0);
        } else {
            for r in 0..self.rows() {
                for c in 0..self.columns() {
                    self.set_value(r, c, 0.0);
                }
            }
        }
    }
}

impl MatrixStorage for DenseMatrix {
    #[inline]
    fn rows(&self) -> usize {
        self.core.rows()
    }

    #[inline]
    fn columns(&self) -> usize {
        self.core.columns()
    }

    #[inline]
    fn is_scalar(&self) -> bool {
        self.core.scalar
    }

    #[inline]
    fn value(&self, row: usize, column: usize) -> f64 {
        self.core
            .storage_index(row, column)
            .and_then(|index| self.data.read().get(index).copied())
            .unwrap_or(0.0)
    }

    #[inline]
    fn set_value(&mut self, row: usize, column: usize, value: f64) {
        if let Some(index) = self.core.storage_index(row, column) {
            if let Some(cell) = self.data.write().get_mut(index) {
                *cell = value;
            }
        }
    }

    #[inline]
    fn is_masked(&self, row: usize, column: usize) -> bool {
        self.core.is_masked(row, column)
    }

    #[inline]
    fn has_mask(&self) -> bool {
        self.core.has_mask()
    }
}

impl fmt::Debug for DenseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseMatrix")
            .field("rows", &self.rows())
            .field("columns", &self.columns())
            .field("scalar", &self.core.scalar)
            .field("transposed", &self.core.view.transposed)
            .field("masked", &self.core.has_mask())
            .finish()
    }
}
