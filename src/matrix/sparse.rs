//! Hash-map backed matrix storing only non-zero entries

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::core::MatrixCore;
use super::storage::MatrixStorage;
use crate::error::{Error, Result};
use crate::mask::MaskKind;

/// Sparse storage keyed by `row * physical_columns + column`
///
/// Writing zero removes the key, so the map never holds a zero entry.
pub struct SparseMatrix {
    pub(crate) core: MatrixCore,
    data: Arc<RwLock<HashMap<usize, f64>>>,
}

impl SparseMatrix {
    /// Empty (all-zero) matrix
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            core: MatrixCore::new(rows, columns, false),
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 1x1 matrix that broadcasts against any shape
    pub fn scalar(value: f64) -> Self {
        let mut data = HashMap::new();
        if value != 0.0 {
            data.insert(0, value);
        }
        Self {
            core: MatrixCore::new(1, 1, true),
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Build from `(row, column, value)` triplets; later duplicates overwrite
    pub fn from_triplets(rows: usize, columns: usize, entries: &[(usize, usize, f64)]) -> Result<Self> {
        let mut data = HashMap::with_capacity(entries.len());
        for &(r, c, v) in entries {
            if r >= rows || c >= columns {
                return Err(Error::IndexOutOfBounds {
                    index: if r >= rows { r } else { c },
                    size: if r >= rows { rows } else { columns },
                });
            }
            if v == 0.0 {
                data.remove(&(r * columns + c));
            } else {
                data.insert(r * columns + c, v);
            }
        }
        Ok(Self {
            core: MatrixCore::new(rows, columns, false),
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Build from row-major dense data, dropping zeros
    pub fn from_vec(rows: usize, columns: usize, values: &[f64]) -> Result<Self> {
        if values.len() != rows * columns {
            return Err(Error::invalid_argument(
                "values",
                format!(
                    "expected {} values for a {}x{} matrix, got {}",
                    rows * columns,
                    rows,
                    columns,
                    values.len()
                ),
            ));
        }
        let data = values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .collect();
        Ok(Self {
            core: MatrixCore::new(rows, columns, false),
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Number of stored (non-zero) entries in the backing store
    pub fn nonzero_count(&self) -> usize {
        self.data.read().len()
    }

    /// Stored entries as logical `(row, column, value)`, in row-major order
    pub fn entries(&self) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::new();
        for r in 0..self.rows() {
            for c in 0..self.columns() {
                let v = self.value(r, c);
                if v != 0.0 {
                    out.push((r, c, v));
                }
            }
        }
        out
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

    pub(crate) fn shares_storage(&self, other: &SparseMatrix) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) const MASK_KIND: MaskKind = MaskKind::Sparse;

    pub(crate) fn fill_zero(&mut self) {
        if self.core.view.is_full(self.core.physical_rows, self.core.physical_columns) || self.core.scalar {
            self.data.write().clear();
        } else {
            for r in 0..self.rows() {
                for c in 0..self.columns() {
                    self.set_value(r, c, 0.0);
                }
            }
        }
    }
}

impl MatrixStorage for SparseMatrix {
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
            .and_then(|key| self.data.read().get(&key).copied())
            .unwrap_or(0.0)
    }

    #[inline]
    fn set_value(&mut self, row: usize, column: usize, value: f64) {
        let Some(key) = self.core.storage_index(row, column) else {
            return;
        };
        let mut data = self.data.write();
        if value == 0.0 {
            data.remove(&key);
        } else {
            data.insert(key, value);
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

impl fmt::Debug for SparseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMatrix")
            .field("rows", &self.rows())
            .field("columns", &self.columns())
            .field("nnz", &self.nonzero_count())
            .field("scalar", &self.core.scalar)
            .field("transposed", &self.core.view.transposed)
            .finish()
    }
}
