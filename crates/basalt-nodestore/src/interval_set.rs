//! Interval set of ledger sequence numbers.
//!
//! Shards track which sequences they have stored as a union of inclusive
//! `[lo, hi]` intervals, and persist the set as text in the control file.
//! The same representation renders the store's "complete shards" status
//! string.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Errors parsing the control-file text form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalParseError {
    /// A range element was not `lo` or `lo-hi`.
    #[error("malformed range element: {0:?}")]
    Malformed(String),

    /// A range was descending.
    #[error("descending range: {0}-{1}")]
    Descending(u32, u32),
}

/// A set of `u32` sequence numbers stored as coalesced intervals.
///
/// The map is keyed by interval start with inclusive ends as values;
/// neighbors are merged on insert so the intervals are always disjoint
/// and non-adjacent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SeqRangeSet {
    // start -> inclusive end
    ranges: BTreeMap<u32, u32>,
}

impl SeqRangeSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the number of sequences in the set.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.ranges
            .iter()
            .map(|(&lo, &hi)| u64::from(hi) - u64::from(lo) + 1)
            .sum()
    }

    /// Returns the smallest element.
    #[must_use]
    pub fn first(&self) -> Option<u32> {
        self.ranges.keys().next().copied()
    }

    /// Returns the largest element.
    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.ranges.values().next_back().copied()
    }

    /// Returns true if `seq` is in the set.
    #[must_use]
    pub fn contains(&self, seq: u32) -> bool {
        self.ranges
            .range(..=seq)
            .next_back()
            .is_some_and(|(_, &hi)| seq <= hi)
    }

    /// Inserts one sequence. Returns false if it was already present.
    pub fn insert(&mut self, seq: u32) -> bool {
        if self.contains(seq) {
            return false;
        }
        self.insert_span(seq, seq);
        true
    }

    /// Inserts the inclusive span `[lo, hi]`, coalescing with neighbors.
    pub fn insert_span(&mut self, lo: u32, hi: u32) {
        debug_assert!(lo <= hi);
        let mut lo = lo;
        let mut hi = hi;

        // Absorb any interval overlapping or adjacent to [lo, hi].
        let mut absorbed = Vec::new();
        for (&start, &end) in self.ranges.range(..=hi.saturating_add(1)) {
            if u64::from(end) + 1 >= u64::from(lo) {
                absorbed.push(start);
                lo = lo.min(start);
                hi = hi.max(end);
            }
        }
        for start in absorbed {
            self.ranges.remove(&start);
        }
        self.ranges.insert(lo, hi);
    }

    /// Clears the set.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Returns the greatest sequence in `[lo, hi]` that is not in the set.
    #[must_use]
    pub fn prev_missing_in(&self, lo: u32, hi: u32) -> Option<u32> {
        if lo > hi {
            return None;
        }
        let mut candidate = hi;
        loop {
            match self.ranges.range(..=candidate).next_back() {
                Some((&start, &end)) if candidate <= end => {
                    // Candidate is covered; jump below the interval.
                    if start == 0 || start - 1 < lo {
                        return None;
                    }
                    candidate = start - 1;
                }
                _ => return Some(candidate),
            }
        }
    }

    /// Iterates over the disjoint `(lo, hi)` intervals in ascending order.
    pub fn iter_ranges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.ranges.iter().map(|(&lo, &hi)| (lo, hi))
    }

    /// Parses the text form produced by [`fmt::Display`].
    ///
    /// The grammar is comma-separated elements, each `lo` or `lo-hi`; the
    /// empty string is the empty set.
    ///
    /// # Errors
    ///
    /// Returns an [`IntervalParseError`] on malformed input.
    pub fn parse(text: &str) -> Result<Self, IntervalParseError> {
        let mut set = Self::new();
        let text = text.trim();
        if text.is_empty() {
            return Ok(set);
        }
        for element in text.split(',') {
            let element = element.trim();
            match element.split_once('-') {
                Some((lo, hi)) => {
                    let lo: u32 = lo
                        .trim()
                        .parse()
                        .map_err(|_| IntervalParseError::Malformed(element.to_string()))?;
                    let hi: u32 = hi
                        .trim()
                        .parse()
                        .map_err(|_| IntervalParseError::Malformed(element.to_string()))?;
                    if hi < lo {
                        return Err(IntervalParseError::Descending(lo, hi));
                    }
                    set.insert_span(lo, hi);
                }
                None => {
                    let seq: u32 = element
                        .parse()
                        .map_err(|_| IntervalParseError::Malformed(element.to_string()))?;
                    set.insert(seq);
                }
            }
        }
        Ok(set)
    }
}

impl fmt::Display for SeqRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (lo, hi) in self.iter_ranges() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if lo == hi {
                write!(f, "{lo}")?;
            } else {
                write!(f, "{lo}-{hi}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SeqRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqRangeSet({self})")
    }
}
