//! Matrix identity for expression recording

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a matrix's backing storage
///
/// References share the id of the matrix they alias; copies get a fresh one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixId(u64);

impl MatrixId {
    /// Create a new unique id
    #[inline]
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for MatrixId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MatrixId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Matrix({})", self.0)
    }
}
