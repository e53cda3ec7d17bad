//! A fixed-capacity bit vector indexed by dense ids.
//!
//! Blocks, loop bodies, excluded cohorts and aliasing pairs are all small
//! dense integer sets, so they share this representation. The capacity is
//! fixed at construction; operations between two sets require equal
//! capacities.
//!
//! # Example
//!
//! ```rust
//! use optigraph::utils::BitSet;
//!
//! let mut body = BitSet::new(8);
//! body.insert(1);
//! body.insert(4);
//!
//! assert!(body.contains(4));
//! assert_eq!(body.iter().collect::<Vec<_>>(), vec![1, 4]);
//! ```

use std::fmt;

const WORD_BITS: usize = 64;

/// A fixed-capacity set of small integers.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// Creates an empty set able to hold `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
        }
    }

    /// Returns the capacity of this set.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no index is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Inserts `index`, returning `true` if it was not present before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.capacity()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.capacity, "bit index {index} out of range");
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Removes `index`, returning `true` if it was present.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.capacity()`.
    pub fn remove(&mut self, index: usize) -> bool {
        assert!(index < self.capacity, "bit index {index} out of range");
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        let present = *word & mask != 0;
        *word &= !mask;
        present
    }

    /// Returns `true` if `index` is set. Indices beyond the capacity are never set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Returns the number of set indices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns the largest set index, if any.
    #[must_use]
    pub fn highest(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &w)| w != 0)
            .map(|(i, &w)| i * WORD_BITS + (WORD_BITS - 1 - w.leading_zeros() as usize))
    }

    /// Clears every index.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Keeps only indices also present in `other`. Returns `true` if `self` changed.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a & b)
    }

    /// Returns `true` if every index of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter().chain(std::iter::repeat(&0)))
            .all(|(a, b)| a & !b == 0)
    }

    /// Iterates the set indices in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn combine(&mut self, other: &Self, op: impl Fn(u64, u64) -> u64) -> bool {
        assert_eq!(self.capacity, other.capacity, "bit set capacity mismatch");
        let mut changed = false;
        for (a, &b) in self.words.iter_mut().zip(&other.words) {
            let next = op(*a, b);
            changed |= next != *a;
            *a = next;
        }
        changed
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Ascending iterator over a [`BitSet`].
pub struct Iter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.index * WORD_BITS + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_report_membership_changes() {
        let mut set = BitSet::new(130);
        assert!(set.insert(129));
        assert!(!set.insert(129));
        assert!(set.contains(129));
        assert!(!set.contains(500));
        assert!(set.remove(129));
        assert!(!set.remove(129));
        assert!(set.is_empty());
    }

    #[test]
    fn set_algebra() {
        let mut a = BitSet::new(100);
        let mut b = BitSet::new(100);
        a.insert(1);
        a.insert(64);
        b.insert(64);
        b.insert(99);

        let mut inter = a.clone();
        assert!(inter.intersect_with(&b));
        assert_eq!(inter.iter().collect::<Vec<_>>(), vec![64]);
        assert!(inter.is_subset(&a));
        assert!(!inter.intersect_with(&b));
        assert!(!a.is_subset(&b));
    }

    #[test]
    fn highest_on_empty_set() {
        assert_eq!(BitSet::new(10).highest(), None);
        assert_eq!(BitSet::new(0).iter().next(), None);
    }
}
