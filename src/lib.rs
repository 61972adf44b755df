//! # nnmatrix
//!
//! **Masked two-dimensional matrices and the numeric kernels of a neural network.**
//!
//! nnmatrix provides dense, sparse and joined matrices behind one [`Matrix`](matrix::Matrix)
//! type, parameterized activation and loss functions with their derivatives,
//! convolution, pooling and softmax kernels, and sequences of matrices with
//! statistics across the sequence.
//!
//! ## Features
//!
//! - **Matrix kinds**: row-major dense storage, hash-map sparse storage, and
//!   joined matrices that reference their parts without copying
//! - **Views**: transpose and slice share storage with the original
//! - **Masking**: cell, row and column masks with save/restore stacks;
//!   every kernel skips masked cells
//! - **Functions**: unary activations and binary losses with derivatives,
//!   configured through named parameters
//! - **Kernels**: element-wise arithmetic with scalar broadcasting, matrix
//!   product, convolution, cross-correlation, max, random, cyclic and
//!   average pooling, softmax and Gumbel softmax
//! - **Training helpers**: weight initializers, dropout, gradient clipping,
//!   normalization and sampling, with seedable variants taking any `Rng`
//! - **Recording**: an optional recorder observes every operation, for use
//!   by an automatic differentiation layer
//!
//! ## Quick Start
//!
//! ```
//! use nnmatrix::prelude::*;
//!
//! let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]])?;
//! let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]])?;
//!
//! let c = a.add(&b)?;
//! let d = a.dot(&b)?;
//! assert_eq!(c.to_vec(), vec![6.0, 8.0, 10.0, 12.0]);
//! assert_eq!(d.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
//!
//! let relu = UnaryFunction::new(UnaryFunctionType::Relu)?;
//! let activated = a.subtract(&Matrix::scalar(2.5))?.apply(&relu)?;
//! assert_eq!(activated.to_vec(), vec![0.0, 0.0, 0.5, 1.5]);
//! # Ok::<(), nnmatrix::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `sparse` (default): hash-map backed sparse matrix kind

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod error;
pub mod function;
pub mod mask;
pub mod matrix;
pub mod ops;
pub mod recorder;
pub mod sequence;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::function::{
        BinaryFunction, BinaryFunctionType, FunctionParams, UnaryFunction, UnaryFunctionType,
    };
    pub use crate::mask::{Mask, MaskKind, MaskStackKind, SharedMask};
    pub use crate::matrix::{
        ConvolutionFans, DenseMatrix, Initialization, JoinDirection, JoinedMatrix, Matrix,
        MatrixFactory, MatrixId, MatrixKind, MatrixStorage,
    };
    pub use crate::ops::{
        ConvOps, ConvolutionMode, ConvolutionParams, ElementwiseOps, LinalgOps, NormalizeOps,
        PoolIndices, PoolOps, PoolParams, RandomOps, ReduceOps, SoftmaxOps, StructureOps,
    };
    pub use crate::recorder::{
        ExpressionKind, ExpressionLog, ExpressionRecorder, RecordedExpression, RecorderHandle,
    };
    pub use crate::sequence::{MatrixSequence, SequenceOperand};

    #[cfg(feature = "sparse")]
    pub use crate::matrix::SparseMatrix;
}
