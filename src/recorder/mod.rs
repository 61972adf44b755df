//! Recording hook for an external expression graph
//!
//! Operations notify an optional [`ExpressionRecorder`] attached to their
//! operands: once before touching the result ([`ExpressionRecorder::start_expression`])
//! and once after ([`ExpressionRecorder::record`]). Absence of a recorder only
//! skips the notifications; numeric results are identical.

mod log;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

pub use log::{ExpressionLog, LoggedExpression};

use crate::error::{Error, Result};
use crate::function::{BinaryFunctionType, UnaryFunctionType};
use crate::matrix::{Matrix, MatrixStorage};

static NEXT_LOCK: AtomicU64 = AtomicU64::new(1);

/// Token pairing a `start_expression` call with its `record` call
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExpressionLock(u64);

impl ExpressionLock {
    /// Create a new unique lock
    #[inline]
    pub fn new() -> Self {
        Self(NEXT_LOCK.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw lock value
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for ExpressionLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation reported to a recorder
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ExpressionKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Dot,
    Unary(UnaryFunctionType),
    UnaryDerivative(UnaryFunctionType),
    Binary(BinaryFunctionType),
    BinaryDerivative(BinaryFunctionType),
    Sum,
    Mean,
    Variance,
    StandardDeviation,
    Normalize,
    Softmax,
    GumbelSoftmax,
    Convolve,
    Crosscorrelate,
    MaxPool,
    AveragePool,
    RandomPool,
    CyclicPool,
    Dropout,
    Join,
    Unjoin,
    Split,
    Concatenate,
}

/// Numeric settings of a recorded operation, e.g. `("stride", 2.0)`
pub type ExpressionParams = SmallVec<[(&'static str, f64); 4]>;

/// A completed operation as seen by the recorder
///
/// Operands and result are storage-sharing references without a recorder
/// attached, so holding them does not keep the recorder alive.
pub struct RecordedExpression {
    /// Operation kind
    pub kind: ExpressionKind,
    /// Inputs in call order
    pub operands: Vec<Matrix>,
    /// Output
    pub result: Matrix,
    /// Operation settings
    pub params: ExpressionParams,
}

impl fmt::Debug for RecordedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordedExpression")
            .field("kind", &self.kind)
            .field("operands", &self.operands.len())
            .field("result", &self.result.shape())
            .field("params", &self.params)
            .finish()
    }
}

/// Collaborator notified around matrix operations
pub trait ExpressionRecorder: Send + Sync {
    /// Called before the operation writes its result; `input` is the first operand
    fn start_expression(&self, input: &Matrix) -> ExpressionLock;

    /// Called after the operation completed
    fn record(&self, lock: ExpressionLock, expression: RecordedExpression);
}

/// Shared recorder handle carried by matrices
pub type RecorderHandle = Arc<dyn ExpressionRecorder>;

/// True when both handles point at the same recorder
#[inline]
pub fn same_recorder(a: &RecorderHandle, b: &RecorderHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Resolve the recorder shared by `operands`
///
/// `None` entries are ignored. Two different recorders are an error.
pub fn resolve_recorder(operands: &[&Matrix]) -> Result<Option<RecorderHandle>> {
    let mut resolved: Option<RecorderHandle> = None;
    for operand in operands {
        if let Some(recorder) = operand.recorder() {
            match &resolved {
                Some(existing) if !same_recorder(existing, recorder) => {
                    tracing::debug!("operands carry different expression recorders");
                    return Err(Error::ConflictingRecorders);
                }
                Some(_) => {}
                None => resolved = Some(Arc::clone(recorder)),
            }
        }
    }
    Ok(resolved)
}

/// Pending notification for one operation
pub(crate) struct RecordScope {
    active: Option<(RecorderHandle, ExpressionLock)>,
}

impl RecordScope {
    pub(crate) fn begin(recorder: Option<&RecorderHandle>, input: &Matrix) -> Self {
        let active = recorder.map(|recorder| {
            let lock = recorder.start_expression(input);
            tracing::trace!(lock = lock.raw(), "expression started");
            (Arc::clone(recorder), lock)
        });
        Self { active }
    }

    pub(crate) fn finish(
        self,
        kind: ExpressionKind,
        operands: &[&Matrix],
        result: &Matrix,
        params: ExpressionParams,
    ) {
        if let Some((recorder, lock)) = self.active {
            tracing::trace!(lock = lock.raw(), ?kind, "expression recorded");
            recorder.record(
                lock,
                RecordedExpression {
                    kind,
                    operands: operands.iter().map(|m| m.detached_reference()).collect(),
                    result: result.detached_reference(),
                    params,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;

    #[test]
    fn test_unique_locks() {
        let a = ExpressionLock::new();
        let b = ExpressionLock::new();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_resolve_recorder() {
        let log: RecorderHandle = Arc::new(ExpressionLog::new());
        let other: RecorderHandle = Arc::new(ExpressionLog::new());

        let mut a = Matrix::from(DenseMatrix::new(2, 2));
        let mut b = Matrix::from(DenseMatrix::new(2, 2));
        let plain = Matrix::from(DenseMatrix::new(2, 2));

        assert!(resolve_recorder(&[&a, &plain]).unwrap().is_none());

        a.set_recorder(Some(Arc::clone(&log)));
        let resolved = resolve_recorder(&[&plain, &a]).unwrap().unwrap();
        assert!(same_recorder(&resolved, &log));

        b.set_recorder(Some(Arc::clone(&log)));
        assert!(resolve_recorder(&[&a, &b]).unwrap().is_some());

        b.set_recorder(Some(other));
        assert_eq!(
            resolve_recorder(&[&a, &b]).err().unwrap(),
            Error::ConflictingRecorders
        );
    }
}
