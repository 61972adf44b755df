//! Ordered sequences of equally shaped matrices
//!
//! A [`MatrixSequence`] applies single-matrix operations entry by entry and
//! adds reductions across the sequence (sum, mean, variance, standard
//! deviation). Binary operations take a [`SequenceOperand`]: another sequence
//! of the same depth, paired by key, or a single matrix applied to every
//! entry.
//!
//! ```
//! use nnmatrix::prelude::*;
//!
//! let mut sequence = MatrixSequence::new();
//! sequence.push(Matrix::from_rows(&[[1.0, 2.0]])?)?;
//! sequence.push(Matrix::from_rows(&[[3.0, 6.0]])?)?;
//!
//! let mean = sequence.mean()?;
//! assert_eq!(mean.to_vec(), vec![2.0, 4.0]);
//! # Ok::<(), nnmatrix::error::Error>(())
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use smallvec::smallvec;

use crate::error::{Error, Result};
use crate::function::{BinaryFunction, UnaryFunction};
use crate::matrix::{DenseMatrix, JoinDirection, Matrix, MatrixFactory, MatrixStorage};
use crate::ops::{ElementwiseOps, LinalgOps, SoftmaxOps, StructureOps, recorded};
use crate::recorder::ExpressionKind;

/// Second operand of a sequence operation
#[derive(Clone, Copy, Debug)]
pub enum SequenceOperand<'a> {
    /// Paired entry by entry; depths must match
    Sequence(&'a MatrixSequence),
    /// Applied to every entry
    Matrix(&'a Matrix),
}

impl<'a> From<&'a MatrixSequence> for SequenceOperand<'a> {
    fn from(sequence: &'a MatrixSequence) -> Self {
        SequenceOperand::Sequence(sequence)
    }
}

impl<'a> From<&'a Matrix> for SequenceOperand<'a> {
    fn from(matrix: &'a Matrix) -> Self {
        SequenceOperand::Matrix(matrix)
    }
}

/// Keyed collection of matrices with the shape of the first inserted entry
#[derive(Debug, Default)]
pub struct MatrixSequence {
    entries: BTreeMap<usize, Matrix>,
    capacity: Option<usize>,
    /// Reference to the first inserted matrix, used to manufacture results
    prototype: Option<Matrix>,
    name: Option<String>,
}

impl MatrixSequence {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Unbounded empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty sequence holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::invalid_argument(
                "capacity",
                "Capacity must be at least 1",
            ));
        }
        Ok(Self {
            capacity: Some(capacity),
            ..Self::default()
        })
    }

    /// Sequence keyed `0..n` over `matrices`
    pub fn from_matrices(matrices: impl IntoIterator<Item = Matrix>) -> Result<Self> {
        let mut sequence = Self::new();
        for matrix in matrices {
            sequence.push(matrix)?;
        }
        Ok(sequence)
    }

    /// Empty sequence with the same capacity and name
    fn empty_like(&self) -> Self {
        Self {
            capacity: self.capacity,
            name: self.name.clone(),
            ..Self::default()
        }
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Insert or replace the entry at `key`
    ///
    /// The shape must equal the first inserted matrix. A new key beyond the
    /// capacity fails with [`Error::CapacityExceeded`].
    pub fn put(&mut self, key: usize, matrix: Matrix) -> Result<()> {
        if let Some(prototype) = &self.prototype {
            if prototype.shape() != matrix.shape() {
                tracing::debug!(key, expected = ?prototype.shape(), got = ?matrix.shape(), "sequence entry shape");
                return Err(Error::incompatible_dimensions(
                    "sequence_put",
                    prototype.shape(),
                    matrix.shape(),
                ));
            }
        }
        if let Some(capacity) = self.capacity {
            if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
                return Err(Error::CapacityExceeded { capacity });
            }
        }
        if self.prototype.is_none() {
            self.prototype = Some(matrix.reference());
        }
        self.entries.insert(key, matrix);
        Ok(())
    }

    /// Append after the last key and return the key used
    pub fn push(&mut self, matrix: Matrix) -> Result<usize> {
        let key = self.entries.last_key_value().map_or(0, |(&k, _)| k + 1);
        self.put(key, matrix)?;
        Ok(key)
    }

    /// Entry at `key`
    pub fn get(&self, key: usize) -> Option<&Matrix> {
        self.entries.get(&key)
    }

    /// Mutable entry at `key`
    pub fn get_mut(&mut self, key: usize) -> Option<&mut Matrix> {
        self.entries.get_mut(&key)
    }

    /// Remove and return the entry at `key`
    pub fn remove(&mut self, key: usize) -> Option<Matrix> {
        self.entries.remove(&key)
    }

    /// Drop every entry and forget the first-entry shape
    pub fn clear(&mut self) {
        self.entries.clear();
        self.prototype = None;
    }

    /// Number of entries
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// True when the sequence has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Matrix)> + '_ {
        self.entries.iter().map(|(&k, m)| (k, m))
    }

    /// Entry with the smallest key
    pub fn first(&self) -> Option<&Matrix> {
        self.entries.values().next()
    }

    /// Shape shared by every entry
    pub fn shape(&self) -> Option<[usize; 2]> {
        self.prototype.as_ref().map(|m| m.shape())
    }

    /// Zeroed matrix of the kind and shape of the first inserted entry
    pub fn new_matrix(&self) -> Option<Matrix> {
        self.prototype.as_ref().map(MatrixFactory::new_matrix)
    }

    /// Sequence name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the sequence name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Sequence of references sharing storage with these entries
    pub fn reference(&self) -> Self {
        self.map_entries(Matrix::reference)
    }

    /// Fully independent copy
    pub fn copy(&self) -> Self {
        self.map_entries(Matrix::copy)
    }

    fn map_entries<F: Fn(&Matrix) -> Matrix>(&self, f: F) -> Self {
        Self {
            entries: self.entries.iter().map(|(&k, m)| (k, f(m))).collect(),
            capacity: self.capacity,
            prototype: self.prototype.as_ref().map(&f),
            name: self.name.clone(),
        }
    }

    /// Entry-by-entry equality within `tolerance`
    pub fn equals(&self, other: &MatrixSequence, tolerance: f64) -> bool {
        self.depth() == other.depth()
            && self
                .entries
                .iter()
                .all(|(k, m)| other.get(*k).is_some_and(|o| m.equals(o, tolerance)))
    }

    // ========================================================================
    // Entry-wise operations
    // ========================================================================

    fn check_depth(&self, other: &MatrixSequence) -> Result<()> {
        if self.depth() != other.depth() {
            tracing::debug!(lhs = self.depth(), rhs = other.depth(), "sequence depths differ");
            return Err(Error::incompatible_dimensions(
                "sequence_depth",
                [self.depth(), 1],
                [other.depth(), 1],
            ));
        }
        Ok(())
    }

    /// Apply `f` to every entry
    fn map<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&Matrix) -> Result<Matrix>,
    {
        let mut result = self.empty_like();
        for (&key, matrix) in &self.entries {
            result.put(key, f(matrix)?)?;
        }
        Ok(result)
    }

    /// Apply `f` to every entry and its counterpart in `other`
    fn zip_with<'a, F>(&self, other: impl Into<SequenceOperand<'a>>, f: F) -> Result<Self>
    where
        F: Fn(&Matrix, &Matrix) -> Result<Matrix>,
    {
        match other.into() {
            SequenceOperand::Matrix(other) => self.map(|m| f(m, other)),
            SequenceOperand::Sequence(other) => {
                self.check_depth(other)?;
                let mut result = self.empty_like();
                for (&key, matrix) in &self.entries {
                    let counterpart = other.get(key).ok_or_else(|| {
                        Error::invalid_argument("other", format!("sequence has no entry at key {key}"))
                    })?;
                    result.put(key, f(matrix, counterpart)?)?;
                }
                Ok(result)
            }
        }
    }

    /// Entry-wise sum
    pub fn add<'a>(&self, other: impl Into<SequenceOperand<'a>>) -> Result<Self> {
        self.zip_with(other, |a, b| a.add(b))
    }

    /// Entry-wise difference
    pub fn subtract<'a>(&self, other: impl Into<SequenceOperand<'a>>) -> Result<Self> {
        self.zip_with(other, |a, b| a.subtract(b))
    }

    /// Entry-wise element product
    pub fn multiply<'a>(&self, other: impl Into<SequenceOperand<'a>>) -> Result<Self> {
        self.zip_with(other, |a, b| a.multiply(b))
    }

    /// Entry-wise quotient
    pub fn divide<'a>(&self, other: impl Into<SequenceOperand<'a>>) -> Result<Self> {
        self.zip_with(other, |a, b| a.divide(b))
    }

    /// Entry-wise matrix product
    pub fn dot<'a>(&self, other: impl Into<SequenceOperand<'a>>) -> Result<Self> {
        self.zip_with(other, |a, b| a.dot(b))
    }

    /// Entry-wise binary function
    pub fn apply_bi<'a>(&self, other: impl Into<SequenceOperand<'a>>, function: &BinaryFunction) -> Result<Self> {
        self.zip_with(other, |a, b| a.apply_bi(b, function))
    }

    /// Unary function on every entry
    ///
    /// Softmax kinds run the column-vector algorithm per entry.
    pub fn apply(&self, function: &UnaryFunction) -> Result<Self> {
        self.map(|m| function.apply_function(m))
    }

    /// Softmax of every entry
    pub fn softmax(&self) -> Result<Self> {
        self.map(|m| m.softmax())
    }

    /// Gumbel softmax of every entry
    pub fn gumbel_softmax(&self, tau: f64) -> Result<Self> {
        self.gumbel_softmax_with_rng(tau, &mut rand::rng())
    }

    /// [`MatrixSequence::gumbel_softmax`] with a caller supplied generator
    pub fn gumbel_softmax_with_rng<R: Rng + ?Sized>(&self, tau: f64, rng: &mut R) -> Result<Self> {
        let mut result = self.empty_like();
        for (&key, matrix) in &self.entries {
            result.put(key, matrix.gumbel_softmax_with_rng(tau, rng)?)?;
        }
        Ok(result)
    }

    // ========================================================================
    // Reductions across the sequence
    // ========================================================================

    fn entry_shape(&self, op: &'static str) -> Result<[usize; 2]> {
        match (self.first(), self.shape()) {
            (Some(_), Some(shape)) => Ok(shape),
            _ => {
                tracing::debug!(op, "reduction over an empty sequence");
                Err(Error::invalid_argument("sequence", format!("{op} requires a non-empty sequence")))
            }
        }
    }

    /// Add the unmasked cells of every entry into `target`
    fn accumulate_into(&self, target: &mut Matrix) {
        for matrix in self.entries.values() {
            let masked = matrix.has_mask();
            for r in 0..matrix.rows() {
                for c in 0..matrix.columns() {
                    if !masked || !matrix.is_masked(r, c) {
                        target.increment_by_value(r, c, matrix.value(r, c));
                    }
                }
            }
        }
    }

    fn operands(&self) -> Vec<&Matrix> {
        self.entries.values().collect()
    }

    /// Cell-wise sum over entries
    pub fn sum(&self) -> Result<Matrix> {
        let [rows, columns] = self.entry_shape("sum")?;
        let mut result: Matrix = DenseMatrix::new(rows, columns).into();
        recorded(ExpressionKind::Sum, &self.operands(), &mut result, smallvec![], |result| {
            self.accumulate_into(result);
            Ok(())
        })?;
        Ok(result)
    }

    /// Write the cell-wise mean over entries into the zeroed `target`
    fn mean_into(&self, target: &mut Matrix) {
        let depth = self.depth() as f64;
        self.accumulate_into(target);
        for r in 0..target.rows() {
            for c in 0..target.columns() {
                let total = target.value(r, c);
                target.set_value(r, c, total / depth);
            }
        }
    }

    /// Write the cell-wise mean squared deviation from `mean` into the zeroed `target`
    fn variance_into(&self, mean: Option<&Matrix>, target: &mut Matrix) {
        let [rows, columns] = target.shape();
        let computed;
        let mean = match mean {
            Some(mean) => mean,
            None => {
                let mut values: Matrix = DenseMatrix::new(rows, columns).into();
                self.mean_into(&mut values);
                computed = values;
                &computed
            }
        };
        for matrix in self.entries.values() {
            let masked = matrix.has_mask();
            for r in 0..rows {
                for c in 0..columns {
                    if !masked || !matrix.is_masked(r, c) {
                        let deviation = matrix.value(r, c) - mean.value(r, c);
                        target.increment_by_value(r, c, deviation * deviation);
                    }
                }
            }
        }
        let depth = self.depth() as f64;
        for r in 0..rows {
            for c in 0..columns {
                let total = target.value(r, c);
                target.set_value(r, c, total / depth);
            }
        }
    }

    /// Entries followed by the caller supplied mean, checked against the entry shape
    fn with_mean<'a>(&'a self, op: &'static str, shape: [usize; 2], mean: Option<&'a Matrix>) -> Result<Vec<&'a Matrix>> {
        let mut operands = self.operands();
        if let Some(mean) = mean {
            if !mean.is_scalar() && mean.shape() != shape {
                tracing::debug!(op, expected = ?shape, got = ?mean.shape(), "mean does not match entries");
                return Err(Error::incompatible_dimensions(op, shape, mean.shape()));
            }
            operands.push(mean);
        }
        Ok(operands)
    }

    /// Cell-wise `sum / depth`
    pub fn mean(&self) -> Result<Matrix> {
        let [rows, columns] = self.entry_shape("mean")?;
        let mut result: Matrix = DenseMatrix::new(rows, columns).into();
        recorded(ExpressionKind::Mean, &self.operands(), &mut result, smallvec![], |result| {
            self.mean_into(result);
            Ok(())
        })?;
        Ok(result)
    }

    /// Cell-wise mean squared deviation from `mean`, or from [`MatrixSequence::mean`]
    pub fn variance(&self, mean: Option<&Matrix>) -> Result<Matrix> {
        let shape = self.entry_shape("variance")?;
        let operands = self.with_mean("variance", shape, mean)?;
        let mut result: Matrix = DenseMatrix::new(shape[0], shape[1]).into();
        recorded(ExpressionKind::Variance, &operands, &mut result, smallvec![], |result| {
            self.variance_into(mean, result);
            Ok(())
        })?;
        Ok(result)
    }

    /// `sqrt(variance * depth / (depth - 1))`; needs at least two entries
    pub fn standard_deviation(&self, mean: Option<&Matrix>) -> Result<Matrix> {
        let shape = self.entry_shape("standard_deviation")?;
        let depth = self.depth();
        if depth < 2 {
            return Err(Error::invalid_argument(
                "sequence",
                format!("standard deviation requires at least 2 entries, got {depth}"),
            ));
        }
        let operands = self.with_mean("standard_deviation", shape, mean)?;
        let correction = depth as f64 / (depth - 1) as f64;
        let mut result: Matrix = DenseMatrix::new(shape[0], shape[1]).into();
        recorded(
            ExpressionKind::StandardDeviation,
            &operands,
            &mut result,
            smallvec![("depth", depth as f64)],
            |result| {
                self.variance_into(mean, result);
                for r in 0..shape[0] {
                    for c in 0..shape[1] {
                        let variance = result.value(r, c);
                        result.set_value(r, c, (variance * correction).sqrt());
                    }
                }
                Ok(())
            },
        )?;
        Ok(result)
    }

    // ========================================================================
    // Reshaping
    // ========================================================================

    /// Every entry serialized into one column
    ///
    /// Cell (row, column) of the entry at position d lands at
    /// `row + rows * column + rows * columns * d`.
    pub fn flatten(&self) -> Result<Self> {
        let [rows, columns] = self.entry_shape("flatten")?;
        let mut column = DenseMatrix::new(rows * columns * self.depth(), 1);
        for (d, matrix) in self.entries.values().enumerate() {
            for r in 0..rows {
                for c in 0..columns {
                    column.set_value(r + rows * c + rows * columns * d, 0, matrix.value(r, c));
                }
            }
        }
        let mut result = Self::with_capacity(1)?;
        result.name = self.name.clone();
        result.put(0, column.into())?;
        Ok(result)
    }

    /// Inverse of [`MatrixSequence::flatten`]
    pub fn unflatten(&self, rows: usize, columns: usize, depth: usize) -> Result<Self> {
        let source = match (self.depth(), self.first()) {
            (1, Some(source)) => source,
            _ => {
                return Err(Error::invalid_argument(
                    "sequence",
                    "unflatten requires a single column vector entry",
                ));
            }
        };
        let expected = [rows * columns * depth, 1];
        if source.shape() != expected {
            return Err(Error::incompatible_dimensions("unflatten", expected, source.shape()));
        }
        let mut result = Self::with_capacity(depth.max(1))?;
        result.name = self.name.clone();
        for d in 0..depth {
            let mut matrix = DenseMatrix::new(rows, columns);
            for r in 0..rows {
                for c in 0..columns {
                    matrix.set_value(r, c, source.value(r + rows * c + rows * columns * d, 0));
                }
            }
            result.put(d, matrix.into())?;
        }
        Ok(result)
    }

    /// Join the entries of `sequences` key by key
    ///
    /// Every sequence must have the same depth and keys.
    pub fn join(sequences: &[&MatrixSequence], direction: JoinDirection) -> Result<Self> {
        let Some(first) = sequences.first() else {
            return Err(Error::invalid_argument("sequences", "join requires at least one sequence"));
        };
        for other in &sequences[1..] {
            first.check_depth(other)?;
        }
        let mut result = first.empty_like();
        for key in first.keys() {
            let mut parts = Vec::with_capacity(sequences.len());
            for sequence in sequences {
                let part = sequence.get(key).ok_or_else(|| {
                    Error::invalid_argument("sequences", format!("sequence has no entry at key {key}"))
                })?;
                parts.push(part);
            }
            result.put(key, Matrix::join(&parts, direction)?)?;
        }
        Ok(result)
    }

    /// Split joined entries back into one sequence per part
    ///
    /// Parts are returned as references.
    pub fn unjoin(&self) -> Result<Vec<Self>> {
        let mut result: Vec<Self> = Vec::new();
        for (&key, matrix) in &self.entries {
            let joined = matrix.as_joined().ok_or_else(|| {
                Error::illegal_operation("unjoin", format!("entry {key} is not a joined matrix"))
            })?;
            if result.is_empty() {
                result = (0..joined.part_count()).map(|_| self.empty_like()).collect();
            }
            if joined.part_count() != result.len() {
                return Err(Error::illegal_operation(
                    "unjoin",
                    format!("entry {key} has {} parts, expected {}", joined.part_count(), result.len()),
                ));
            }
            for (sequence, part) in result.iter_mut().zip(joined.parts()) {
                sequence.put(key, part.reference())?;
            }
        }
        Ok(result)
    }

    /// Copy the same region out of every entry
    pub fn unjoin_region(&self, row: usize, column: usize, rows: usize, columns: usize) -> Result<Self> {
        self.map(|m| m.unjoin(row, column, rows, columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sequence() -> MatrixSequence {
        MatrixSequence::from_matrices([
            Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap(),
            Matrix::from_rows(&[[3.0, 2.0], [5.0, 0.0]]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_capacity() {
        assert!(matches!(
            MatrixSequence::with_capacity(0),
            Err(Error::InvalidArgument { arg: "capacity", .. })
        ));
        let mut s = MatrixSequence::with_capacity(1).unwrap();
        s.put(0, Matrix::dense(1, 1)).unwrap();
        s.put(0, Matrix::dense(1, 1)).unwrap();
        assert_eq!(
            s.put(1, Matrix::dense(1, 1)).unwrap_err(),
            Error::CapacityExceeded { capacity: 1 }
        );
    }

    #[test]
    fn test_shape_follows_first_entry() {
        let mut s = sequence();
        assert!(matches!(
            s.push(Matrix::dense(3, 3)),
            Err(Error::IncompatibleDimensions { .. })
        ));
        assert_eq!(s.push(Matrix::dense(2, 2)).unwrap(), 2);
    }

    #[test]
    fn test_statistics() {
        let s = sequence();
        assert_eq!(s.sum().unwrap().to_vec(), vec![4.0, 4.0, 8.0, 4.0]);
        let mean = s.mean().unwrap();
        assert_eq!(mean.to_vec(), vec![2.0, 2.0, 4.0, 2.0]);
        let variance = s.variance(Some(&mean)).unwrap();
        assert_eq!(variance.to_vec(), vec![1.0, 0.0, 1.0, 4.0]);
        let sd = s.standard_deviation(None).unwrap();
        assert_relative_eq!(sd.value(0, 0), 2.0f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(sd.value(1, 1), 8.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_standard_deviation_needs_two_entries() {
        let s = MatrixSequence::from_matrices([Matrix::dense(1, 1)]).unwrap();
        assert!(s.standard_deviation(None).is_err());
        assert!(MatrixSequence::new().sum().is_err());
    }

    #[test]
    fn test_depth_mismatch() {
        let s = sequence();
        let short = MatrixSequence::from_matrices([Matrix::dense(2, 2)]).unwrap();
        assert!(matches!(
            s.add(&short),
            Err(Error::IncompatibleDimensions { op: "sequence_depth", .. })
        ));
        let shifted = s.add(&Matrix::scalar(1.0)).unwrap();
        assert_eq!(shifted.get(1).unwrap().to_vec(), vec![4.0, 3.0, 6.0, 1.0]);
    }

    #[test]
    fn test_flatten_layout() {
        let flat = sequence().flatten().unwrap();
        let column = flat.get(0).unwrap();
        assert_eq!(column.shape(), [8, 1]);
        // column-major within an entry, entries one after another
        assert_eq!(column.to_vec(), vec![1.0, 3.0, 2.0, 4.0, 3.0, 5.0, 2.0, 0.0]);
        let back = flat.unflatten(2, 2, 2).unwrap();
        assert!(back.equals(&sequence(), 0.0));
        assert!(flat.unflatten(2, 2, 3).is_err());
    }

    #[test]
    fn test_join_and_unjoin() {
        let a = sequence();
        let b = sequence();
        let joined = MatrixSequence::join(&[&a, &b], JoinDirection::Vertical).unwrap();
        assert_eq!(joined.shape(), Some([4, 2]));
        let parts = joined.unjoin().unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[1].get(0).unwrap().shares_storage(b.get(0).unwrap()));
        assert!(a.unjoin().is_err());

        let region = joined.unjoin_region(2, 0, 2, 2).unwrap();
        assert!(region.equals(&b, 0.0));
    }
}
