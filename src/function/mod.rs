//! Scalar function framework
//!
//! [`UnaryFunction`] covers activations and elementary math, [`BinaryFunction`]
//! covers losses and combinators of `(value, constant)`. Both pair a forward
//! formula with its analytic derivative and take named constants through
//! [`FunctionParams`].

mod binary;
mod params;
mod unary;

pub use binary::{BinaryFunction, BinaryFunctionType, PairFn};
pub use params::FunctionParams;
pub use unary::{ScalarFn, UnaryFunction, UnaryFunctionType};
