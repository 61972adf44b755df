//! Bit stores backing a single mask layer

use std::collections::HashSet;

/// Storage strategy of a mask
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// One flag per position
    Dense,
    /// Only set positions are stored
    Sparse,
}

/// Flags for `len` positions
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum MaskBits {
    Dense(Vec<bool>),
    Sparse { set: HashSet<usize>, len: usize },
}

impl MaskBits {
    pub(crate) fn new(kind: MaskKind, len: usize) -> Self {
        match kind {
            MaskKind::Dense => Self::Dense(vec![false; len]),
            MaskKind::Sparse => Self::Sparse {
                set: HashSet::new(),
                len,
            },
        }
    }

    /// All-false store of the same kind and length
    pub(crate) fn fresh(&self) -> Self {
        match self {
            Self::Dense(bits) => Self::Dense(vec![false; bits.len()]),
            Self::Sparse { len, .. } => Self::Sparse {
                set: HashSet::new(),
                len: *len,
            },
        }
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> bool {
        match self {
            Self::Dense(bits) => bits.get(index).copied().unwrap_or(false),
            Self::Sparse { set, .. } => set.contains(&index),
        }
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, value: bool) {
        match self {
            Self::Dense(bits) => {
                if let Some(bit) = bits.get_mut(index) {
                    *bit = value;
                }
            }
            Self::Sparse { set, len } => {
                if index >= *len {
                    return;
                }
                if value {
                    set.insert(index);
                } else {
                    set.remove(&index);
                }
            }
        }
    }

    pub(crate) fn count(&self) -> usize {
        match self {
            Self::Dense(bits) => bits.iter().filter(|&&b| b).count(),
            Self::Sparse { set, .. } => set.len(),
        }
    }

    pub(crate) fn any(&self) -> bool {
        match self {
            Self::Dense(bits) => bits.iter().any(|&b| b),
            Self::Sparse { set, .. } => !set.is_empty(),
        }
    }
}
