//! Shared validation and geometry for convolution and pooling operations.
//!
//! Both operation families slide a window over the input in stride-sized steps
//! starting at 0, so they share the output-size formula and the parameter
//! checks below.

use crate::error::{Error, Result};
use crate::matrix::{Matrix, MatrixStorage};

/// Filter indexing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvolutionMode {
    /// Filter indexed reversed along both axes
    Convolution,
    /// Filter indexed in natural order
    #[default]
    CrossCorrelation,
}

impl ConvolutionMode {
    /// Filter index used for window position `position` of a filter of length `size`
    #[inline]
    pub fn filter_index(self, position: usize, size: usize) -> usize {
        match self {
            ConvolutionMode::Convolution => size - 1 - position,
            ConvolutionMode::CrossCorrelation => position,
        }
    }

    /// Returns the name of the mode for error messages.
    pub fn name(self) -> &'static str {
        match self {
            ConvolutionMode::Convolution => "convolve",
            ConvolutionMode::CrossCorrelation => "crosscorrelate",
        }
    }
}

/// Stride and dilation of a convolution
///
/// The filter size is the shape of the filter matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionParams {
    stride: usize,
    dilation: usize,
}

impl ConvolutionParams {
    /// Validated parameters; both values must be positive
    pub fn new(stride: usize, dilation: usize) -> Result<Self> {
        validate_positive(stride, "stride", "convolution")?;
        validate_positive(dilation, "dilation", "convolution")?;
        Ok(Self { stride, dilation })
    }

    /// Step between output positions
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Step between active filter taps
    pub fn dilation(&self) -> usize {
        self.dilation
    }
}

impl Default for ConvolutionParams {
    fn default() -> Self {
        Self {
            stride: 1,
            dilation: 1,
        }
    }
}

/// Window size and stride of a pooling operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParams {
    size: usize,
    stride: usize,
}

impl PoolParams {
    /// Validated parameters; both values must be positive
    pub fn new(size: usize, stride: usize) -> Result<Self> {
        validate_positive(size, "size", "pooling")?;
        validate_positive(stride, "stride", "pooling")?;
        Ok(Self { size, stride })
    }

    /// Side length of the square pool window
    pub fn size(&self) -> usize {
        self.size
    }

    /// Step between output positions
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Nominal window area used as the average pool divisor
    #[inline]
    pub(crate) fn area(&self) -> f64 {
        (self.size * self.size) as f64
    }
}

/// Validates that stride, dilation, and window sizes are non-zero.
#[inline]
pub fn validate_positive(value: usize, name: &'static str, op: &'static str) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidArgument {
            arg: name,
            reason: format!("{} requires {} > 0, got 0", op, name),
        });
    }
    Ok(())
}

/// Computes output size for a single dimension.
///
/// output_size = (input_size - window_size) / stride + 1
#[inline]
pub fn compute_output_size(input_size: usize, window_size: usize, stride: usize) -> Option<usize> {
    if window_size == 0 || window_size > input_size || stride == 0 {
        return None;
    }
    Some((input_size - window_size) / stride + 1)
}

/// Output shape of sliding `window` over `input`, or a dimension error
pub(crate) fn output_shape(
    op: &'static str,
    input: [usize; 2],
    window: [usize; 2],
    stride: usize,
) -> Result<[usize; 2]> {
    match (
        compute_output_size(input[0], window[0], stride),
        compute_output_size(input[1], window[1], stride),
    ) {
        (Some(rows), Some(columns)) => Ok([rows, columns]),
        _ => {
            tracing::debug!(op, ?input, ?window, stride, "window does not fit input");
            Err(Error::incompatible_dimensions(op, input, window))
        }
    }
}

/// Checks that `result` has the shape the operation produces.
#[inline]
pub(crate) fn validate_result_shape(result: &Matrix, expected: [usize; 2]) -> Result<()> {
    if result.shape() != expected {
        tracing::debug!(?expected, got = ?result.shape(), "result matrix has wrong shape");
        return Err(Error::result_shape(expected, result.shape()));
    }
    Ok(())
}

/// Checks that an input-sized gradient target slides to `output` under `window`.
pub(crate) fn validate_gradient_target(
    op: &'static str,
    target: [usize; 2],
    window: [usize; 2],
    stride: usize,
    output: [usize; 2],
) -> Result<()> {
    let produced = output_shape(op, target, window, stride)?;
    if produced != output {
        tracing::debug!(op, ?target, ?output, "gradient target does not match output gradient");
        return Err(Error::incompatible_dimensions(op, produced, output));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size() {
        assert_eq!(compute_output_size(4, 2, 2), Some(2));
        assert_eq!(compute_output_size(5, 3, 1), Some(3));
        assert_eq!(compute_output_size(5, 2, 2), Some(2));
        assert_eq!(compute_output_size(2, 3, 1), None);
    }

    #[test]
    fn test_params_must_be_positive() {
        let err = ConvolutionParams::new(0, 1).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidArgument {
                arg: "stride",
                reason: "convolution requires stride > 0, got 0".into(),
            }
        );
        assert!(PoolParams::new(2, 0).is_err());
        assert_eq!(PoolParams::new(2, 2).unwrap().area(), 4.0);
    }

    #[test]
    fn test_filter_index() {
        assert_eq!(ConvolutionMode::Convolution.filter_index(0, 3), 2);
        assert_eq!(ConvolutionMode::CrossCorrelation.filter_index(0, 3), 0);
    }
}
