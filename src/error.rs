//! Error types for nnmatrix

use crate::mask::MaskStackKind;
use thiserror::Error;

/// Result type alias using nnmatrix's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in matrix, mask and function operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operand shapes are not compatible for the operation
    #[error("Incompatible dimensions for '{op}': {lhs:?} vs {rhs:?}")]
    IncompatibleDimensions {
        /// The operation name
        op: &'static str,
        /// Left-hand side shape as [rows, columns]
        lhs: [usize; 2],
        /// Right-hand side shape as [rows, columns]
        rhs: [usize; 2],
    },

    /// A caller supplied result buffer has the wrong shape
    #[error("Incompatible result matrix size: expected {expected:?}, got {got:?}")]
    ResultShapeMismatch {
        /// Shape the operation produces
        expected: [usize; 2],
        /// Shape of the supplied result
        got: [usize; 2],
    },

    /// Structural operation not allowed on this matrix kind
    #[error("Illegal operation '{op}': {reason}")]
    IllegalOperation {
        /// The operation name
        op: &'static str,
        /// Why it is not allowed
        reason: String,
    },

    /// Pop from an empty mask stack
    #[error("{stack} stack is empty")]
    StackEmpty {
        /// Which of the three mask stacks was popped
        stack: MaskStackKind,
    },

    /// Index out of bounds
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index
        index: usize,
        /// Size of the dimension
        size: usize,
    },

    /// Invalid argument provided to an operation or constructor
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Function variant cannot be built this way or is unknown
    #[error("Unsupported function '{name}': {reason}")]
    UnsupportedFunction {
        /// Function type name
        name: String,
        /// Reason for rejection
        reason: &'static str,
    },

    /// Parameter name not accepted by the function
    #[error("Invalid parameter '{name}' for function '{function}'")]
    InvalidParameter {
        /// Function type name
        function: String,
        /// Offending parameter name
        name: String,
    },

    /// Operands carry different expression recorders
    #[error("Operands are attached to different expression recorders")]
    ConflictingRecorders,

    /// Insert into a full matrix sequence
    #[error("Sequence exceeding defined capacity of {capacity}")]
    CapacityExceeded {
        /// Declared capacity
        capacity: usize,
    },
}

impl Error {
    /// Create an incompatible dimensions error
    pub fn incompatible_dimensions(op: &'static str, lhs: [usize; 2], rhs: [usize; 2]) -> Self {
        Self::IncompatibleDimensions { op, lhs, rhs }
    }

    /// Create a result shape error
    pub fn result_shape(expected: [usize; 2], got: [usize; 2]) -> Self {
        Self::ResultShapeMismatch { expected, got }
    }

    /// Create an illegal operation error
    pub fn illegal_operation(op: &'static str, reason: impl Into<String>) -> Self {
        Self::IllegalOperation {
            op,
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an unsupported function error
    pub fn unsupported_function(name: impl Into<String>, reason: &'static str) -> Self {
        Self::UnsupportedFunction {
            name: name.into(),
            reason,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(function: impl Into<String>, name: impl Into<String>) -> Self {
        Self::InvalidParameter {
            function: function.into(),
            name: name.into(),
        }
    }
}

/// Check that `index < size`
#[inline]
pub(crate) fn check_index(index: usize, size: usize) -> Result<()> {
    if index < size {
        Ok(())
    } else {
        Err(Error::IndexOutOfBounds { index, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::incompatible_dimensions("add", [3, 4], [4, 3]);
        assert_eq!(
            err.to_string(),
            "Incompatible dimensions for 'add': [3, 4] vs [4, 3]"
        );

        let err = Error::StackEmpty {
            stack: MaskStackKind::Row,
        };
        assert_eq!(err.to_string(), "Row mask stack is empty");
    }

    #[test]
    fn test_check_index() {
        assert!(check_index(2, 3).is_ok());
        assert_eq!(
            check_index(3, 3),
            Err(Error::IndexOutOfBounds { index: 3, size: 3 })
        );
    }
}
