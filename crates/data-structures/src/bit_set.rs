use smallvec::SmallVec;
use std::fmt;

/// A fixed-size dense bit set.
///
/// The size is chosen at construction; every operation asserts that indices are in range.
/// Sets of up to 256 bits are stored inline.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: SmallVec<[u64; 4]>,
    len: usize,
}

impl BitSet {
    /// Creates a new, empty bit set holding `len` bits.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { words: smallvec::smallvec![0; len.div_ceil(64)], len }
    }

    /// Returns the number of bits this set can hold.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Returns `true` if bit `idx` is set.
    #[inline]
    #[must_use]
    pub fn test(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bit {idx} out of range for set of {}", self.len);
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    /// Sets bit `idx`. Returns `true` if it was previously clear.
    #[inline]
    pub fn set(&mut self, idx: usize) -> bool {
        assert!(idx < self.len, "bit {idx} out of range for set of {}", self.len);
        let word = &mut self.words[idx / 64];
        let mask = 1 << (idx % 64);
        let was_clear = *word & mask == 0;
        *word |= mask;
        was_clear
    }

    /// Clears bit `idx`.
    #[inline]
    pub fn clear(&mut self, idx: usize) {
        assert!(idx < self.len, "bit {idx} out of range for set of {}", self.len);
        self.words[idx / 64] &= !(1 << (idx % 64));
    }

    /// Sets every bit in `range`.
    pub fn set_range(&mut self, range: std::ops::Range<usize>) {
        for idx in range {
            self.set(idx);
        }
    }

    /// Clears every bit.
    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Returns the index of the lowest clear bit, if any.
    #[must_use]
    pub fn first_clear(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)
            .map(|(i, w)| i * 64 + w.trailing_ones() as usize)
            .filter(|&idx| idx < self.len)
    }

    /// Removes every bit that is set in `other`.
    pub fn subtract(&mut self, other: &Self) {
        assert_eq!(self.len, other.len, "bit set size mismatch");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !*b;
        }
    }

    /// Returns `true` if any bit is set in both `self` and `other`.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit set size mismatch");
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns an iterator over the indices of all set bits, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64).filter(move |&bit| word & (1 << bit) != 0).map(move |bit| i * 64 + bit)
        })
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
