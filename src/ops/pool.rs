//! Max, random, cyclic and average pooling with gradients
//!
//! Max, random and cyclic pooling are positional: each output cell copies one
//! input cell of its window and records where it came from in
//! [`PoolIndices`]. Their gradients route every output gradient value back to
//! that coordinate.

use rand::Rng;
use smallvec::smallvec;

use super::conv_common::{PoolParams, output_shape, validate_gradient_target};
use super::recorded;
use crate::error::{Error, Result};
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Input coordinate chosen for every output cell of a positional pool
///
/// `None` marks output cells whose whole window was masked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolIndices {
    rows: usize,
    columns: usize,
    input_rows: usize,
    input_columns: usize,
    positions: Vec<Option<(usize, usize)>>,
}

impl PoolIndices {
    /// Output shape
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.columns]
    }

    /// Shape of the pooled input
    pub fn input_shape(&self) -> [usize; 2] {
        [self.input_rows, self.input_columns]
    }

    /// Input coordinate that produced output cell (row, column)
    pub fn get(&self, row: usize, column: usize) -> Option<(usize, usize)> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.positions[row * self.columns + column]
    }
}

/// Pooling operations
///
/// Windows are `size x size`, anchored at (i * stride, j * stride).
pub trait PoolOps {
    /// Window maximum and the coordinate it came from
    ///
    /// Ties keep the first value seen in row-major window order.
    fn max_pool(&self, params: PoolParams) -> Result<(Matrix, PoolIndices)>;

    /// Route each output gradient value to its recorded argmax
    fn max_pool_gradient(&self, indices: &PoolIndices) -> Result<Matrix>;

    /// A uniformly drawn unmasked cell of every window
    fn random_pool(&self, params: PoolParams) -> Result<(Matrix, PoolIndices)>;

    /// [`PoolOps::random_pool`] with a caller supplied generator
    fn random_pool_with_rng<R: Rng + ?Sized>(
        &self,
        params: PoolParams,
        rng: &mut R,
    ) -> Result<(Matrix, PoolIndices)>;

    /// Route each output gradient value to its recorded random pick
    fn random_pool_gradient(&self, indices: &PoolIndices) -> Result<Matrix>;

    /// Window cells picked by a cursor that cycles through window positions
    ///
    /// The cursor starts at window offset (0, 0) and moves one step per output
    /// cell, down the window rows first and then across its columns, wrapping
    /// back to (0, 0). Masked positions are stepped over.
    fn cyclic_pool(&self, params: PoolParams) -> Result<(Matrix, PoolIndices)>;

    /// Route each output gradient value to its recorded cyclic pick
    fn cyclic_pool_gradient(&self, indices: &PoolIndices) -> Result<Matrix>;

    /// Window sum of unmasked cells divided by the nominal window area
    fn average_pool(&self, params: PoolParams) -> Result<Matrix>;

    /// Spread each output gradient value as `g / size²` over its window
    fn average_pool_gradient(
        &self,
        params: PoolParams,
        input_rows: usize,
        input_columns: usize,
    ) -> Result<Matrix>;
}

/// Window position visited next by the cyclic pool
struct CyclicCursor {
    row: usize,
    column: usize,
    size: usize,
}

impl CyclicCursor {
    fn advance(&mut self) {
        self.row += 1;
        if self.row >= self.size {
            self.row = 0;
            self.column += 1;
            if self.column >= self.size {
                self.column = 0;
            }
        }
    }
}

/// Slide the window over `input` and copy the cell `select` picks
///
/// `select` receives the window anchor and returns an absolute input
/// coordinate, or `None` when nothing in the window can be picked.
fn positional_pool<S>(
    input: &Matrix,
    op: &'static str,
    kind: ExpressionKind,
    params: PoolParams,
    mut select: S,
) -> Result<(Matrix, PoolIndices)>
where
    S: FnMut(usize, usize) -> Option<(usize, usize)>,
{
    let (size, stride) = (params.size(), params.stride());
    let [rows, columns] = output_shape(op, input.shape(), [size, size], stride)?;
    let mut result = input.new_matrix_sized(rows, columns);
    let mut positions = Vec::with_capacity(rows * columns);
    let settings = smallvec![("size", size as f64), ("stride", stride as f64)];
    recorded(kind, &[input], &mut result, settings, |result| {
        for i in 0..rows {
            for j in 0..columns {
                let picked = select(i * stride, j * stride);
                result.set_value(i, j, picked.map_or(0.0, |(r, c)| input.value(r, c)));
                positions.push(picked);
            }
        }
        Ok(())
    })?;
    let indices = PoolIndices {
        rows,
        columns,
        input_rows: input.rows(),
        input_columns: input.columns(),
        positions,
    };
    Ok((result, indices))
}

/// Add every unmasked output gradient value at its recorded input coordinate
fn route_gradient(output_gradient: &Matrix, op: &'static str, indices: &PoolIndices) -> Result<Matrix> {
    if output_gradient.shape() != indices.shape() {
        tracing::debug!(op, got = ?output_gradient.shape(), expected = ?indices.shape(), "pool gradient shape");
        return Err(Error::incompatible_dimensions(
            op,
            output_gradient.shape(),
            indices.shape(),
        ));
    }
    let [input_rows, input_columns] = indices.input_shape();
    let mut gradient = output_gradient.new_matrix_sized(input_rows, input_columns);
    let masked = output_gradient.has_mask();
    for i in 0..indices.rows {
        for j in 0..indices.columns {
            if masked && output_gradient.is_masked(i, j) {
                continue;
            }
            if let Some((r, c)) = indices.get(i, j) {
                gradient.increment_by_value(r, c, output_gradient.value(i, j));
            }
        }
    }
    Ok(gradient)
}

impl PoolOps for Matrix {
    fn max_pool(&self, params: PoolParams) -> Result<(Matrix, PoolIndices)> {
        let size = params.size();
        let masked = self.has_mask();
        positional_pool(self, "max_pool", ExpressionKind::MaxPool, params, |row, column| {
            let mut best: Option<(usize, usize, f64)> = None;
            for r in row..row + size {
                for c in column..column + size {
                    if masked && self.is_masked(r, c) {
                        continue;
                    }
                    let v = self.value(r, c);
                    if best.is_none_or(|(_, _, b)| b < v) {
                        best = Some((r, c, v));
                    }
                }
            }
            best.map(|(r, c, _)| (r, c))
        })
    }

    fn max_pool_gradient(&self, indices: &PoolIndices) -> Result<Matrix> {
        route_gradient(self, "max_pool_gradient", indices)
    }

    fn random_pool(&self, params: PoolParams) -> Result<(Matrix, PoolIndices)> {
        self.random_pool_with_rng(params, &mut rand::rng())
    }

    fn random_pool_with_rng<R: Rng + ?Sized>(
        &self,
        params: PoolParams,
        rng: &mut R,
    ) -> Result<(Matrix, PoolIndices)> {
        let size = params.size();
        let masked = self.has_mask();
        let mut available = Vec::with_capacity(size * size);
        positional_pool(self, "random_pool", ExpressionKind::RandomPool, params, |row, column| {
            if !masked {
                return Some((row + rng.random_range(0..size), column + rng.random_range(0..size)));
            }
            available.clear();
            for r in row..row + size {
                for c in column..column + size {
                    if !self.is_masked(r, c) {
                        available.push((r, c));
                    }
                }
            }
            if available.is_empty() {
                return None;
            }
            Some(available[rng.random_range(0..available.len())])
        })
    }

    fn random_pool_gradient(&self, indices: &PoolIndices) -> Result<Matrix> {
        route_gradient(self, "random_pool_gradient", indices)
    }

    fn cyclic_pool(&self, params: PoolParams) -> Result<(Matrix, PoolIndices)> {
        let size = params.size();
        let masked = self.has_mask();
        let mut cursor = CyclicCursor {
            row: 0,
            column: 0,
            size,
        };
        positional_pool(self, "cyclic_pool", ExpressionKind::CyclicPool, params, |row, column| {
            let mut picked = None;
            for _ in 0..size * size {
                let (r, c) = (row + cursor.row, column + cursor.column);
                if !masked || !self.is_masked(r, c) {
                    picked = Some((r, c));
                    break;
                }
                cursor.advance();
            }
            cursor.advance();
            picked
        })
    }

    fn cyclic_pool_gradient(&self, indices: &PoolIndices) -> Result<Matrix> {
        route_gradient(self, "cyclic_pool_gradient", indices)
    }

    fn average_pool(&self, params: PoolParams) -> Result<Matrix> {
        let (size, stride) = (params.size(), params.stride());
        let [rows, columns] = output_shape("average_pool", self.shape(), [size, size], stride)?;
        let mut result = self.new_matrix_sized(rows, columns);
        let area = params.area();
        let masked = self.has_mask();
        let settings = smallvec![("size", size as f64), ("stride", stride as f64)];
        recorded(ExpressionKind::AveragePool, &[self], &mut result, settings, |result| {
            for i in 0..rows {
                for j in 0..columns {
                    let mut sum = 0.0;
                    for r in i * stride..i * stride + size {
                        for c in j * stride..j * stride + size {
                            if !masked || !self.is_masked(r, c) {
                                sum += self.value(r, c);
                            }
                        }
                    }
                    result.set_value(i, j, sum / area);
                }
            }
            Ok(())
        })?;
        Ok(result)
    }

    fn average_pool_gradient(
        &self,
        params: PoolParams,
        input_rows: usize,
        input_columns: usize,
    ) -> Result<Matrix> {
        let (size, stride) = (params.size(), params.stride());
        validate_gradient_target(
            "average_pool_gradient",
            [input_rows, input_columns],
            [size, size],
            stride,
            self.shape(),
        )?;
        let mut gradient = self.new_matrix_sized(input_rows, input_columns);
        let area = params.area();
        let masked = self.has_mask();
        let [rows, columns] = self.shape();
        for i in 0..rows {
            for j in 0..columns {
                if masked && self.is_masked(i, j) {
                    continue;
                }
                let share = self.value(i, j) / area;
                for r in i * stride..i * stride + size {
                    for c in j * stride..j * stride + size {
                        gradient.increment_by_value(r, c, share);
                    }
                }
            }
        }
        Ok(gradient)
    }
}
