//! A mask layer with its save/restore stack

use std::mem;

use super::MaskStackKind;
use super::bits::MaskBits;
use crate::error::{Error, Result};

/// Saved stack entry
///
/// `Aliased` stands for a push without reset: the entry shares the array that
/// is current at the time, so later edits are visible through it.
#[derive(Clone, Debug)]
enum Saved {
    Detached(MaskBits),
    Aliased,
}

#[derive(Clone, Debug)]
pub(crate) struct MaskLayer {
    current: MaskBits,
    saved: Vec<Saved>,
}

impl MaskLayer {
    pub(crate) fn new(bits: MaskBits) -> Self {
        Self {
            current: bits,
            saved: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn bits(&self) -> &MaskBits {
        &self.current
    }

    #[inline]
    pub(crate) fn bits_mut(&mut self) -> &mut MaskBits {
        &mut self.current
    }

    pub(crate) fn stack(&mut self, reset: bool) {
        if reset {
            let fresh = self.current.fresh();
            self.saved
                .push(Saved::Detached(mem::replace(&mut self.current, fresh)));
        } else {
            self.saved.push(Saved::Aliased);
        }
    }

    pub(crate) fn unstack(&mut self, kind: MaskStackKind) -> Result<()> {
        match self.saved.pop() {
            Some(Saved::Detached(bits)) => {
                self.current = bits;
                Ok(())
            }
            Some(Saved::Aliased) => Ok(()),
            None => Err(Error::StackEmpty { stack: kind }),
        }
    }

    /// Replace the current array with an all-false one
    pub(crate) fn clear(&mut self) {
        // entries aliasing the outgoing array keep its contents
        for entry in self.saved.iter_mut().rev() {
            if !matches!(entry, Saved::Aliased) {
                break;
            }
            *entry = Saved::Detached(self.current.clone());
        }
        self.current = self.current.fresh();
    }

    pub(crate) fn stack_len(&self) -> usize {
        self.saved.len()
    }

    pub(crate) fn clear_stack(&mut self) {
        self.saved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskKind;

    fn layer() -> MaskLayer {
        MaskLayer::new(MaskBits::new(MaskKind::Dense, 4))
    }

    #[test]
    fn test_reset_push_restores() {
        let mut layer = layer();
        layer.bits_mut().set(0, true);
        layer.stack(true);
        assert!(!layer.bits().get(0));
        layer.bits_mut().set(2, true);
        layer.unstack(MaskStackKind::Cell).unwrap();
        assert!(layer.bits().get(0));
        assert!(!layer.bits().get(2));
    }

    #[test]
    fn test_aliased_push_keeps_edits() {
        let mut layer = layer();
        layer.stack(false);
        layer.bits_mut().set(1, true);
        layer.unstack(MaskStackKind::Cell).unwrap();
        assert!(layer.bits().get(1));
    }

    #[test]
    fn test_clear_detaches_alias() {
        let mut layer = layer();
        layer.bits_mut().set(3, true);
        layer.stack(false);
        layer.clear();
        assert!(!layer.bits().get(3));
        layer.unstack(MaskStackKind::Cell).unwrap();
        assert!(layer.bits().get(3));
    }

    #[test]
    fn test_empty_pop() {
        let mut layer = layer();
        assert_eq!(
            layer.unstack(MaskStackKind::Column),
            Err(Error::StackEmpty {
                stack: MaskStackKind::Column
            })
        );
        layer.stack(true);
        layer.stack(false);
        assert_eq!(layer.stack_len(), 2);
        layer.clear_stack();
        assert!(layer.unstack(MaskStackKind::Column).is_err());
    }
}
