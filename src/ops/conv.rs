//! Convolution and cross-correlation with input and filter gradients
//!
//! Output cell (i, j) reads the window anchored at input
//! (i * stride, j * stride). Window position p along an axis contributes
//! only when `p % dilation == 0` and pairs the input cell at offset p with
//! filter index p (cross-correlation) or `size - 1 - p` (convolution).
//! The gradient passes walk the same positions and accumulate with `+=`.

use smallvec::smallvec;

use super::conv_common::{
    ConvolutionMode, ConvolutionParams, output_shape, validate_gradient_target,
    validate_result_shape,
};
use super::{any_masked, recorded};
use crate::error::Result;
use crate::matrix::{Matrix, MatrixFactory, MatrixStorage};
use crate::recorder::ExpressionKind;

/// Convolution operations over single-channel 2-D matrices
///
/// `self` is the input for the forward pass and the output gradient for the
/// gradient passes.
pub trait ConvOps {
    /// Convolution with the filter reversed along both axes
    fn convolve(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix>;

    /// Cross-correlation with the filter in natural order
    fn crosscorrelate(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix>;

    /// Forward pass in `mode`, overwriting `result`
    fn convolution_into(
        &self,
        filter: &Matrix,
        result: &mut Matrix,
        params: ConvolutionParams,
        mode: ConvolutionMode,
    ) -> Result<()>;

    /// Gradient of [`ConvOps::convolve`] with respect to its input
    fn convolve_input_gradient(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix>;

    /// Gradient of [`ConvOps::crosscorrelate`] with respect to its input
    fn crosscorrelate_input_gradient(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix>;

    /// Accumulate the input gradient into `input_gradient`
    fn input_gradient_into(
        &self,
        filter: &Matrix,
        input_gradient: &mut Matrix,
        params: ConvolutionParams,
        mode: ConvolutionMode,
    ) -> Result<()>;

    /// Gradient of [`ConvOps::convolve`] with respect to a filter of the given shape
    fn convolve_filter_gradient(
        &self,
        input: &Matrix,
        filter_rows: usize,
        filter_columns: usize,
        params: ConvolutionParams,
    ) -> Result<Matrix>;

    /// Gradient of [`ConvOps::crosscorrelate`] with respect to a filter of the given shape
    fn crosscorrelate_filter_gradient(
        &self,
        input: &Matrix,
        filter_rows: usize,
        filter_columns: usize,
        params: ConvolutionParams,
    ) -> Result<Matrix>;

    /// Accumulate the filter gradient into `filter_gradient`
    fn filter_gradient_into(
        &self,
        input: &Matrix,
        filter_gradient: &mut Matrix,
        params: ConvolutionParams,
        mode: ConvolutionMode,
    ) -> Result<()>;
}

/// Active window positions along one axis
#[inline]
fn taps(size: usize, dilation: usize) -> impl Iterator<Item = usize> {
    (0..size).step_by(dilation)
}

/// Input shape whose forward pass produces `output` under `window`
#[inline]
fn input_extent(output: [usize; 2], window: [usize; 2], stride: usize) -> [usize; 2] {
    [
        output[0].saturating_sub(1) * stride + window[0],
        output[1].saturating_sub(1) * stride + window[1],
    ]
}

impl ConvOps for Matrix {
    fn convolve(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix> {
        let [rows, columns] = output_shape("convolve", self.shape(), filter.shape(), params.stride())?;
        let mut result = self.new_matrix_sized(rows, columns);
        self.convolution_into(filter, &mut result, params, ConvolutionMode::Convolution)?;
        Ok(result)
    }

    fn crosscorrelate(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix> {
        let [rows, columns] =
            output_shape("crosscorrelate", self.shape(), filter.shape(), params.stride())?;
        let mut result = self.new_matrix_sized(rows, columns);
        self.convolution_into(filter, &mut result, params, ConvolutionMode::CrossCorrelation)?;
        Ok(result)
    }

    fn convolution_into(
        &self,
        filter: &Matrix,
        result: &mut Matrix,
        params: ConvolutionParams,
        mode: ConvolutionMode,
    ) -> Result<()> {
        let [filter_rows, filter_columns] = filter.shape();
        let stride = params.stride();
        let dilation = params.dilation();
        let [rows, columns] = output_shape(mode.name(), self.shape(), filter.shape(), stride)?;
        validate_result_shape(result, [rows, columns])?;

        let kind = match mode {
            ConvolutionMode::Convolution => ExpressionKind::Convolve,
            ConvolutionMode::CrossCorrelation => ExpressionKind::Crosscorrelate,
        };
        let settings = smallvec![("stride", stride as f64), ("dilation", dilation as f64)];
        let masked = any_masked(&[self, filter]);
        recorded(kind, &[self, filter], result, settings, |result| {
            for i in 0..rows {
                for j in 0..columns {
                    let mut sum = 0.0;
                    for p in taps(filter_rows, dilation) {
                        let fr = mode.filter_index(p, filter_rows);
                        for q in taps(filter_columns, dilation) {
                            let fc = mode.filter_index(q, filter_columns);
                            let (ir, ic) = (i * stride + p, j * stride + q);
                            if masked && (self.is_masked(ir, ic) || filter.is_masked(fr, fc)) {
                                continue;
                            }
                            sum += self.value(ir, ic) * filter.value(fr, fc);
                        }
                    }
                    result.set_value(i, j, sum);
                }
            }
            Ok(())
        })
    }

    fn convolve_input_gradient(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix> {
        let [rows, columns] = input_extent(self.shape(), filter.shape(), params.stride());
        let mut gradient = self.new_matrix_sized(rows, columns);
        self.input_gradient_into(filter, &mut gradient, params, ConvolutionMode::Convolution)?;
        Ok(gradient)
    }

    fn crosscorrelate_input_gradient(&self, filter: &Matrix, params: ConvolutionParams) -> Result<Matrix> {
        let [rows, columns] = input_extent(self.shape(), filter.shape(), params.stride());
        let mut gradient = self.new_matrix_sized(rows, columns);
        self.input_gradient_into(filter, &mut gradient, params, ConvolutionMode::CrossCorrelation)?;
        Ok(gradient)
    }

    fn input_gradient_into(
        &self,
        filter: &Matrix,
        input_gradient: &mut Matrix,
        params: ConvolutionParams,
        mode: ConvolutionMode,
    ) -> Result<()> {
        let [filter_rows, filter_columns] = filter.shape();
        let stride = params.stride();
        let dilation = params.dilation();
        validate_gradient_target(
            mode.name(),
            input_gradient.shape(),
            filter.shape(),
            stride,
            self.shape(),
        )?;

        let masked = any_masked(&[self, filter]);
        let [rows, columns] = self.shape();
        for i in 0..rows {
            for j in 0..columns {
                if masked && self.is_masked(i, j) {
                    continue;
                }
                let g = self.value(i, j);
                for p in taps(filter_rows, dilation) {
                    let fr = mode.filter_index(p, filter_rows);
                    for q in taps(filter_columns, dilation) {
                        let fc = mode.filter_index(q, filter_columns);
                        if masked && filter.is_masked(fr, fc) {
                            continue;
                        }
                        input_gradient.increment_by_value(
                            i * stride + p,
                            j * stride + q,
                            filter.value(fr, fc) * g,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn convolve_filter_gradient(
        &self,
        input: &Matrix,
        filter_rows: usize,
        filter_columns: usize,
        params: ConvolutionParams,
    ) -> Result<Matrix> {
        let mut gradient = self.new_matrix_sized(filter_rows, filter_columns);
        self.filter_gradient_into(input, &mut gradient, params, ConvolutionMode::Convolution)?;
        Ok(gradient)
    }

    fn crosscorrelate_filter_gradient(
        &self,
        input: &Matrix,
        filter_rows: usize,
        filter_columns: usize,
        params: ConvolutionParams,
    ) -> Result<Matrix> {
        let mut gradient = self.new_matrix_sized(filter_rows, filter_columns);
        self.filter_gradient_into(input, &mut gradient, params, ConvolutionMode::CrossCorrelation)?;
        Ok(gradient)
    }

    fn filter_gradient_into(
        &self,
        input: &Matrix,
        filter_gradient: &mut Matrix,
        params: ConvolutionParams,
        mode: ConvolutionMode,
    ) -> Result<()> {
        let [filter_rows, filter_columns] = filter_gradient.shape();
        let stride = params.stride();
        let dilation = params.dilation();
        validate_gradient_target(
            mode.name(),
            input.shape(),
            filter_gradient.shape(),
            stride,
            self.shape(),
        )?;

        let masked = any_masked(&[self, input]);
        let [rows, columns] = self.shape();
        for i in 0..rows {
            for j in 0..columns {
                if masked && self.is_masked(i, j) {
                    continue;
                }
                let g = self.value(i, j);
                for p in taps(filter_rows, dilation) {
                    let fr = mode.filter_index(p, filter_rows);
                    for q in taps(filter_columns, dilation) {
                        let fc = mode.filter_index(q, filter_columns);
                        let (ir, ic) = (i * stride + p, j * stride + q);
                        if masked && input.is_masked(ir, ic) {
                            continue;
                        }
                        filter_gradient.increment_by_value(fr, fc, input.value(ir, ic) * g);
                    }
                }
            }
        }
        Ok(())
    }
}
