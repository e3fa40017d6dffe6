//! Bit-flag representation of item states.
//!
//! A state is a bit pattern: declared states occupy one bit each, aliases
//! name combinations of bits, and the empty pattern is the default state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Bit pattern identifying a state.
///
/// Backed by a `u64`, so a state set holds at most [`Flags::CAPACITY`]
/// declared states. That is a real limit of the representation.
///
/// # Example
///
/// ```rust
/// use stateshelf::core::Flags;
///
/// let foo = Flags::bit(0);
/// let bar = Flags::bit(1);
/// let both = foo | bar;
///
/// assert!(foo.is_pure());
/// assert!(!both.is_pure());
/// assert!(both.contains(bar));
/// assert_eq!(both.bits().collect::<Vec<_>>(), vec![foo, bar]);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u64);

impl Flags {
    /// The default (zero) state.
    pub const EMPTY: Flags = Flags(0);

    /// Maximum number of declared states.
    pub const CAPACITY: u32 = u64::BITS;

    pub const fn new(value: u64) -> Self {
        Flags(value)
    }

    /// Flag for the declared state at `index`.
    ///
    /// Panics if `index >= Flags::CAPACITY`; `StateSet::add` checks the
    /// capacity before calling this.
    pub const fn bit(index: u32) -> Self {
        Flags(1 << index)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True for the empty state and for single-bit states.
    pub const fn is_pure(self) -> bool {
        self.0 & self.0.wrapping_sub(1) == 0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if `self` is non-empty and has no bits outside `other`.
    pub const fn is_subset_of(self, other: Flags) -> bool {
        self.0 != 0 && self.0 & !other.0 == 0
    }

    pub const fn without(self, other: Flags) -> Self {
        Flags(self.0 & !other.0)
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Single-bit components, lowest bit first.
    pub fn bits(self) -> impl Iterator<Item = Flags> {
        (0..Self::CAPACITY)
            .map(Flags::bit)
            .filter(move |bit| self.contains(*bit))
    }
}

impl From<u64> for Flags {
    fn from(value: u64) -> Self {
        Flags(value)
    }
}

impl From<Flags> for u64 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl Not for Flags {
    type Output = Flags;

    fn not(self) -> Flags {
        Flags(!self.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_single_bits_are_pure() {
        assert!(Flags::EMPTY.is_pure());
        assert!(Flags::bit(0).is_pure());
        assert!(Flags::bit(63).is_pure());
        assert!(!(Flags::bit(0) | Flags::bit(5)).is_pure());
    }

    #[test]
    fn subset_requires_non_empty() {
        let alias = Flags::new(0b011);
        assert!(Flags::new(0b001).is_subset_of(alias));
        assert!(alias.is_subset_of(alias));
        assert!(!Flags::EMPTY.is_subset_of(alias));
        assert!(!Flags::new(0b100).is_subset_of(alias));
    }

    #[test]
    fn without_clears_bits() {
        let state = Flags::new(0b111);
        assert_eq!(state.without(Flags::new(0b010)), Flags::new(0b101));
        assert_eq!(state.without(Flags::new(0b1000)), state);
    }

    #[test]
    fn bits_iterates_low_to_high() {
        let state = Flags::new(0b1010_0001);
        let bits: Vec<u64> = state.bits().map(Flags::value).collect();
        assert_eq!(bits, vec![1, 32, 128]);
        assert_eq!(state.count(), 3);
    }

    #[test]
    fn flags_serialize_as_plain_integers() {
        let json = serde_json::to_string(&Flags::new(6)).unwrap();
        assert_eq!(json, "6");
        let back: Flags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Flags::new(6));
    }
}
