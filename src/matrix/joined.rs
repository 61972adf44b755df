//! Read-through composite of matrices concatenated along one axis

use std::collections::BTreeMap;
use std::fmt;

use super::Matrix;
use super::core::MatrixCore;
use super::storage::MatrixStorage;
use crate::error::{Error, Result};

/// Axis along which parts are concatenated
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JoinDirection {
    /// Parts stacked on top of each other; all share the column count
    Vertical,
    /// Parts placed side by side; all share the row count
    Horizontal,
}

impl JoinDirection {
    /// The other direction
    pub fn flipped(self) -> Self {
        match self {
            Self::Vertical => Self::Horizontal,
            Self::Horizontal => Self::Vertical,
        }
    }
}

/// Several matrices presented as one without copying
///
/// Reads and writes go to the owning part, found through a sorted offset index
/// along the join axis. The composite itself cannot be resized or sliced.
pub struct JoinedMatrix {
    pub(crate) core: MatrixCore,
    parts: Vec<Matrix>,
    /// Offset along the join axis -> part index
    offsets: BTreeMap<usize, usize>,
    direction: JoinDirection,
}

impl JoinedMatrix {
    /// Join `parts` along `direction`
    ///
    /// Parts are held as given; pass references to keep the originals usable.
    pub fn new(parts: Vec<Matrix>, direction: JoinDirection) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(Error::invalid_argument(
                "parts",
                "joined matrix needs at least one part",
            ));
        };
        let first_shape = first.shape();
        let mut offsets = BTreeMap::new();
        let mut extent = 0;
        for (index, part) in parts.iter().enumerate() {
            let shape = part.shape();
            let (shared, joined) = match direction {
                JoinDirection::Vertical => (first_shape[1] == shape[1], shape[0]),
                JoinDirection::Horizontal => (first_shape[0] == shape[0], shape[1]),
            };
            if !shared {
                tracing::debug!(?direction, index, ?shape, "part does not fit joined matrix");
                return Err(Error::incompatible_dimensions("join", first_shape, shape));
            }
            if joined > 0 {
                offsets.insert(extent, index);
            }
            extent += joined;
        }
        let (rows, columns) = match direction {
            JoinDirection::Vertical => (extent, first_shape[1]),
            JoinDirection::Horizontal => (first_shape[0], extent),
        };
        Ok(Self {
            core: MatrixCore::new(rows, columns, false),
            parts,
            offsets,
            direction,
        })
    }

    /// Join direction
    pub fn direction(&self) -> JoinDirection {
        self.direction
    }

    /// Parts in join order
    pub fn parts(&self) -> &[Matrix] {
        &self.parts
    }

    /// Number of parts
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Owning part index and local coordinate of (row, column)
    fn locate(&self, row: usize, column: usize) -> Option<(usize, usize, usize)> {
        let key = match self.direction {
            JoinDirection::Vertical => row,
            JoinDirection::Horizontal => column,
        };
        let (&offset, &index) = self.offsets.range(..=key).next_back()?;
        let (local_row, local_column) = match self.direction {
            JoinDirection::Vertical => (row - offset, column),
            JoinDirection::Horizontal => (row, column - offset),
        };
        let part = &self.parts[index];
        (local_row < part.rows() && local_column < part.columns()).then_some((
            index,
            local_row,
            local_column,
        ))
    }

    pub(crate) fn reference(&self) -> Self {
        Self {
            core: self.core.clone(),
            parts: self.parts.iter().map(Matrix::reference).collect(),
            offsets: self.offsets.clone(),
            direction: self.direction,
        }
    }

    pub(crate) fn copy(&self) -> Self {
        Self {
            core: self.core.deep_copy(),
            parts: self.parts.iter().map(Matrix::copy).collect(),
            offsets: self.offsets.clone(),
            direction: self.direction,
        }
    }

    /// Flip the join axis and transpose every part
    pub(crate) fn transpose(&self) -> Self {
        Self {
            core: self.core.transposed(),
            parts: self.parts.iter().map(Matrix::transpose).collect(),
            offsets: self.offsets.clone(),
            direction: self.direction.flipped(),
        }
    }

    /// Same layout over fresh zeroed parts
    pub(crate) fn new_like(&self) -> Self {
        use super::MatrixFactory;
        Self {
            core: MatrixCore::new(self.rows(), self.columns(), false),
            parts: self.parts.iter().map(Matrix::new_matrix).collect(),
            offsets: self.offsets.clone(),
            direction: self.direction,
        }
    }

    /// Part-by-part comparison, `None` when layouts differ
    pub(crate) fn equals_parts(&self, other: &JoinedMatrix, tolerance: f64) -> Option<bool> {
        if self.direction != other.direction || self.offsets != other.offsets {
            return None;
        }
        Some(
            self.parts
                .iter()
                .zip(&other.parts)
                .all(|(a, b)| a.equals(b, tolerance)),
        )
    }

    pub(crate) fn fill_zero(&mut self) {
        for part in &mut self.parts {
            part.reset();
        }
    }

    pub(crate) fn into_parts(self) -> Vec<Matrix> {
        self.parts
    }
}

impl MatrixStorage for JoinedMatrix {
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
        false
    }

    fn value(&self, row: usize, column: usize) -> f64 {
        self.locate(row, column)
            .map_or(0.0, |(index, r, c)| self.parts[index].value(r, c))
    }

    fn set_value(&mut self, row: usize, column: usize, value: f64) {
        if let Some((index, r, c)) = self.locate(row, column) {
            self.parts[index].set_value(r, c, value);
        }
    }

    fn is_masked(&self, row: usize, column: usize) -> bool {
        self.core.is_masked(row, column)
            || self
                .locate(row, column)
                .is_some_and(|(index, r, c)| self.parts[index].is_masked(r, c))
    }

    fn has_mask(&self) -> bool {
        self.core.has_mask() || self.parts.iter().any(Matrix::has_mask)
    }
}

impl fmt::Debug for JoinedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedMatrix")
            .field("rows", &self.rows())
            .field("columns", &self.columns())
            .field("direction", &self.direction)
            .field("parts", &self.parts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;

    fn parts() -> (Matrix, Matrix) {
        let top = Matrix::from(DenseMatrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap());
        let bottom = Matrix::from(DenseMatrix::from_rows(&[[5.0, 6.0]]).unwrap());
        (top, bottom)
    }

    #[test]
    fn test_vertical_read_through() {
        let (top, bottom) = parts();
        let joined =
            JoinedMatrix::new(vec![top.reference(), bottom.reference()], JoinDirection::Vertical)
                .unwrap();
        assert_eq!(joined.shape(), [3, 2]);
        assert_eq!(joined.value(2, 1), 6.0);
        assert_eq!(joined.value(1, 0), 3.0);
    }

    #[test]
    fn test_writes_reach_parts() {
        let (top, bottom) = parts();
        let mut joined =
            JoinedMatrix::new(vec![top.reference(), bottom.reference()], JoinDirection::Vertical)
                .unwrap();
        joined.set_value(2, 0, 50.0);
        assert_eq!(bottom.value(0, 0), 50.0);
    }

    #[test]
    fn test_mismatched_parts_rejected() {
        let (top, _) = parts();
        let wide = Matrix::from(DenseMatrix::new(1, 3));
        assert!(matches!(
            JoinedMatrix::new(vec![top, wide], JoinDirection::Vertical),
            Err(Error::IncompatibleDimensions { op: "join", .. })
        ));
        assert!(JoinedMatrix::new(Vec::new(), JoinDirection::Horizontal).is_err());
    }

    #[test]
    fn test_transpose_flips_direction() {
        let (top, bottom) = parts();
        let joined = JoinedMatrix::new(vec![top, bottom], JoinDirection::Vertical).unwrap();
        let t = joined.transpose();
        assert_eq!(t.direction(), JoinDirection::Horizontal);
        assert_eq!(t.shape(), [2, 3]);
        for r in 0..3 {
            for c in 0..2 {
                assert_eq!(t.value(c, r), joined.value(r, c));
            }
        }
        assert!(t.parts().iter().all(Matrix::is_transposed));
    }
}
