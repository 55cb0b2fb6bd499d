//! Fixed-width access masks.
//!
//! Every component type and named resource registered with the world is
//! assigned a bit in a 64-bit mask. Entity composition, system access
//! declarations, and the job graph's hazard checks are all mask operations,
//! so membership tests and conflict detection cost a handful of bitwise
//! instructions regardless of how many types are involved.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of component or resource bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mask(u64);

impl Mask {
    /// The number of distinct bits a mask can hold.
    pub const CAPACITY: usize = u64::BITS as usize;

    /// The empty mask.
    pub const EMPTY: Mask = Mask(0);

    /// The mask with every bit set. Systems that claim it conflict with
    /// everything else in their frame.
    pub const ALL: Mask = Mask(u64::MAX);

    /// The mask containing exactly the given bit.
    ///
    /// # Panics
    ///
    /// Panics if `index` is [`CAPACITY`](Self::CAPACITY) or greater.
    pub fn bit(index: usize) -> Mask {
        assert!(
            index < Self::CAPACITY,
            "bit index {index} out of range (capacity {})",
            Self::CAPACITY
        );
        Mask(1 << index)
    }

    /// True if no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if this mask and `other` share at least one bit.
    pub fn intersects(self, other: Mask) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is also set in this mask.
    pub fn contains_all(self, other: Mask) -> bool {
        self.0 & other.0 == other.0
    }

    /// The union of this mask and `other`.
    pub fn union(self, other: Mask) -> Mask {
        Mask(self.0 | other.0)
    }

    /// This mask with every bit of `other` cleared.
    pub fn without(self, other: Mask) -> Mask {
        Mask(self.0 & !other.0)
    }

    /// The raw bit pattern.
    pub fn bits(self) -> u64 {
        self.0
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Mask) -> Mask {
        self.union(rhs)
    }
}

impl BitOrAssign for Mask {
    fn bitor_assign(&mut self, rhs: Mask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mask({:#066b})", self.0)
    }
}
