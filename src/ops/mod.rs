//! Matrix operations
//!
//! Operations are defined as traits implemented for [`Matrix`]. Each kernel
//! is written once against [`MatrixStorage`](crate::matrix::MatrixStorage),
//! so dense, sparse and joined matrices behave identically.
//!
//! ```text
//! Matrix
//!   ├── ElementwiseOps  apply, apply_bi, add, subtract, multiply, divide, ...
//!   ├── LinalgOps       dot
//!   ├── ReduceOps       count, sum, mean, variance, norm, entropy, min_max ...
//!   ├── NormalizeOps    normalize, clip_gradient, classify
//!   ├── RandomOps       dropout, sample
//!   ├── SoftmaxOps      softmax, gumbel_softmax, softmax_grad
//!   ├── ConvOps         convolve, crosscorrelate and their gradients
//!   ├── PoolOps         max, random, cyclic and average pooling with gradients
//!   └── StructureOps    concatenate, join, unjoin, split
//! ```
//!
//! # Masking
//!
//! Every kernel checks the row, column and cell masks of each operand before
//! computing a cell, and skips masked cells. When no operand has a mask the
//! kernel takes an unguarded loop.
//!
//! # Recording
//!
//! Operations resolve the recorder shared by their operands, notify it before
//! and after computing, and attach it to the result. Operands carrying two
//! different recorders fail with [`Error::ConflictingRecorders`](crate::error::Error::ConflictingRecorders).

mod conv;
mod conv_common;
mod elementwise;
mod linalg;
mod normalize;
mod pool;
mod random;
mod reduce;
mod softmax;
mod structure;

pub use conv::ConvOps;
pub use conv_common::{
    ConvolutionMode, ConvolutionParams, PoolParams, compute_output_size, validate_positive,
};
pub use elementwise::ElementwiseOps;
pub use linalg::LinalgOps;
pub use normalize::NormalizeOps;
pub use pool::{PoolIndices, PoolOps};
pub use random::RandomOps;
pub use reduce::ReduceOps;
pub use softmax::SoftmaxOps;
pub use structure::StructureOps;

use crate::error::Result;
use crate::matrix::Matrix;
use crate::recorder::{ExpressionKind, ExpressionParams, RecordScope, resolve_recorder};

/// Run `compute` on `result` with recorder notifications around it
///
/// The recorder resolved from `operands` is attached to `result`.
pub(crate) fn recorded<F>(
    kind: ExpressionKind,
    operands: &[&Matrix],
    result: &mut Matrix,
    params: ExpressionParams,
    compute: F,
) -> Result<()>
where
    F: FnOnce(&mut Matrix) -> Result<()>,
{
    let recorder = resolve_recorder(operands)?;
    let Some(&input) = operands.first() else {
        return compute(result);
    };
    let scope = RecordScope::begin(recorder.as_ref(), input);
    compute(result)?;
    if recorder.is_some() {
        result.set_recorder(recorder);
    }
    scope.finish(kind, operands, result, params);
    Ok(())
}

/// True when any operand carries a mask
#[inline]
pub(crate) fn any_masked(operands: &[&Matrix]) -> bool {
    use crate::matrix::MatrixStorage;
    operands.iter().any(|m| m.has_mask())
}
