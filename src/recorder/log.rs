//! In-memory recorder keeping expressions in completion order

use parking_lot::Mutex;

use super::{ExpressionKind, ExpressionLock, ExpressionRecorder, RecordedExpression};
use crate::matrix::{Matrix, MatrixId};

/// One entry of an [`ExpressionLog`]
#[derive(Debug)]
pub struct LoggedExpression {
    /// Lock handed out by `start_expression`
    pub lock: ExpressionLock,
    /// Id of the matrix the expression started from
    pub input: MatrixId,
    /// The recorded expression
    pub expression: RecordedExpression,
}

/// Recorder that stores every expression for later replay
#[derive(Debug, Default)]
pub struct ExpressionLog {
    started: Mutex<Vec<(ExpressionLock, MatrixId)>>,
    entries: Mutex<Vec<LoggedExpression>>,
}

impl ExpressionLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed expressions
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Kinds of the completed expressions in order
    pub fn kinds(&self) -> Vec<ExpressionKind> {
        self.entries
            .lock()
            .iter()
            .map(|e| e.expression.kind)
            .collect()
    }

    /// Number of expressions started but not yet recorded
    pub fn pending(&self) -> usize {
        self.started.lock().len()
    }

    /// Remove and return all completed expressions
    pub fn drain(&self) -> Vec<LoggedExpression> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Forget everything
    pub fn clear(&self) {
        self.started.lock().clear();
        self.entries.lock().clear();
    }
}

impl ExpressionRecorder for ExpressionLog {
    fn start_expression(&self, input: &Matrix) -> ExpressionLock {
        let lock = ExpressionLock::new();
        self.started.lock().push((lock, input.id()));
        lock
    }

    fn record(&self, lock: ExpressionLock, expression: RecordedExpression) {
        let input = {
            let mut started = self.started.lock();
            match started.iter().position(|(l, _)| *l == lock) {
                Some(index) => started.remove(index).1,
                None => {
                    tracing::debug!(lock = lock.raw(), "record without matching start");
                    expression
                        .operands
                        .first()
                        .map_or_else(|| expression.result.id(), Matrix::id)
                }
            }
        };
        self.entries.lock().push(LoggedExpression {
            lock,
            input,
            expression,
        });
    }
}
