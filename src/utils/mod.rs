//! Shared low-level utilities.

mod bitset;

pub use bitset::{BitSet, Iter as BitSetIter};
