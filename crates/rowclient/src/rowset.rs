// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Row keys addressed by a read request
//!
//! A request addresses explicit keys plus ranges over the key space. The
//! reader narrows the set past the last delivered key when it resumes
//! after a failure; an empty set after narrowing means nothing is
//! outstanding and the stream can end cleanly.
//!
//! There is no "empty means everything" convention here: the full-table
//! set is spelled [`RowSet::all`], so emptiness is always unambiguous.

use std::ops::Bound;

use bytes::Bytes;
use rowcodec::RowKey;

/// A contiguous range of row keys with inclusive, exclusive or unbounded
/// endpoints. Keys order byte-lexicographically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    start: Bound<RowKey>,
    end: Bound<RowKey>,
}

/// The immediate successor of a key in byte-lexicographic order.
fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}

impl RowRange {
    pub fn new(start: Bound<RowKey>, end: Bound<RowKey>) -> Self {
        Self { start, end }
    }

    /// The whole key space.
    pub fn infinite() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// `[start, end]`
    pub fn closed(start: RowKey, end: RowKey) -> Self {
        Self::new(Bound::Included(start), Bound::Included(end))
    }

    /// `(start, end)`
    pub fn open(start: RowKey, end: RowKey) -> Self {
        Self::new(Bound::Excluded(start), Bound::Excluded(end))
    }

    /// `[start, end)` - the conventional scan range.
    pub fn right_open(start: RowKey, end: RowKey) -> Self {
        Self::new(Bound::Included(start), Bound::Excluded(end))
    }

    /// `[start, +inf)`
    pub fn starting_at(start: RowKey) -> Self {
        Self::new(Bound::Included(start), Bound::Unbounded)
    }

    /// `(-inf, end)`
    pub fn up_to(end: RowKey) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(end))
    }

    pub fn start(&self) -> &Bound<RowKey> {
        &self.start
    }

    pub fn end(&self) -> &Bound<RowKey> {
        &self.end
    }

    /// True iff no key can fall inside the range. For two exclusive
    /// endpoints this accounts for byte-string adjacency: there is no key
    /// strictly between `"a"` and `"a\0"`.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e)) => s >= e,
            (Bound::Excluded(s), Bound::Included(e)) => s >= e,
            (Bound::Excluded(s), Bound::Excluded(e)) => {
                e <= s || e.as_ref() == successor(s).as_slice()
            }
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Unbounded => true,
            Bound::Included(s) => key >= s.as_ref(),
            Bound::Excluded(s) => key > s.as_ref(),
        };
        let before_end = match &self.end {
            Bound::Unbounded => true,
            Bound::Included(e) => key <= e.as_ref(),
            Bound::Excluded(e) => key < e.as_ref(),
        };
        after_start && before_end
    }

    /// The portion of this range strictly after `last`, or None if
    /// nothing remains.
    pub fn narrow_after(&self, last: &[u8]) -> Option<RowRange> {
        let start = match &self.start {
            Bound::Included(s) if s.as_ref() > last => Bound::Included(s.clone()),
            Bound::Excluded(s) if s.as_ref() >= last => Bound::Excluded(s.clone()),
            _ => Bound::Excluded(Bytes::copy_from_slice(last)),
        };
        let narrowed = RowRange::new(start, self.end.clone());
        if narrowed.is_empty() { None } else { Some(narrowed) }
    }
}

/// The set of rows a read request addresses: explicit keys plus ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    keys: Vec<RowKey>,
    ranges: Vec<RowRange>,
}

impl RowSet {
    /// Every row in the table.
    pub fn all() -> Self {
        Self {
            keys: Vec::new(),
            ranges: vec![RowRange::infinite()],
        }
    }

    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = RowKey>,
    {
        Self {
            keys: keys.into_iter().collect(),
            ranges: Vec::new(),
        }
    }

    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = RowRange>,
    {
        Self {
            keys: Vec::new(),
            ranges: ranges.into_iter().collect(),
        }
    }

    pub fn push_key(&mut self, key: RowKey) {
        self.keys.push(key);
    }

    pub fn push_range(&mut self, range: RowRange) {
        self.ranges.push(range);
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn ranges(&self) -> &[RowRange] {
        &self.ranges
    }

    /// True iff the set addresses no rows at all.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.ranges.iter().all(RowRange::is_empty)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.keys.iter().any(|k| k.as_ref() == key)
            || self.ranges.iter().any(|r| r.contains(key))
    }

    /// Restrict the set to keys strictly after `last`. Used to compute
    /// the resume request: everything at or before the last delivered key
    /// must never be requested again.
    pub fn narrow_after(&mut self, last: &[u8]) {
        self.keys.retain(|k| k.as_ref() > last);
        self.ranges = self
            .ranges
            .iter()
            .filter_map(|r| r.narrow_after(last))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> RowKey {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn narrowing_the_full_set_leaves_an_open_suffix() {
        let mut set = RowSet::all();
        set.narrow_after(b"m");
        assert!(!set.is_empty());
        assert!(!set.contains(b"a"));
        assert!(!set.contains(b"m"));
        assert!(set.contains(b"m\0"));
        assert!(set.contains(b"z"));
    }

    #[test]
    fn narrowing_drops_delivered_keys() {
        let mut set = RowSet::from_keys([key("a"), key("b"), key("c")]);
        set.narrow_after(b"b");
        assert_eq!(set.keys(), &[key("c")]);
        assert!(!set.is_empty());

        set.narrow_after(b"c");
        assert!(set.is_empty());
    }

    #[test]
    fn narrowing_clips_ranges() {
        let mut set = RowSet::from_ranges([RowRange::right_open(key("a"), key("k"))]);
        set.narrow_after(b"e");
        assert!(!set.contains(b"e"));
        assert!(set.contains(b"f"));
        assert!(!set.contains(b"k"));
    }

    #[test]
    fn range_entirely_before_the_resume_point_disappears() {
        let mut set = RowSet::from_ranges([RowRange::right_open(key("a"), key("c"))]);
        set.narrow_after(b"c");
        assert!(set.is_empty());
    }

    #[test]
    fn ranges_starting_after_the_resume_point_are_untouched() {
        let range = RowRange::right_open(key("m"), key("z"));
        let narrowed = range.narrow_after(b"c").expect("range survives");
        assert_eq!(narrowed, range);
    }

    #[test]
    fn adjacent_exclusive_bounds_are_empty() {
        let range = RowRange::open(key("a"), key("a\0"));
        assert!(range.is_empty());
        let range = RowRange::open(key("a"), key("a\0x"));
        assert!(!range.is_empty());
    }

    #[test]
    fn inverted_and_degenerate_ranges_are_empty() {
        assert!(RowRange::closed(key("b"), key("a")).is_empty());
        assert!(RowRange::right_open(key("a"), key("a")).is_empty());
        assert!(!RowRange::closed(key("a"), key("a")).is_empty());
    }
}
