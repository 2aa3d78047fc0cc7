use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::ops::Range;
use std::slice;

use crate::util::find_match_or_lower_bound_by_key;
use crate::Addr;


/// A half open `[start, end)` range of addresses.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AddressRange {
    start: Addr,
    end: Addr,
}

impl AddressRange {
    /// Create a new [`AddressRange`] covering `[start, end)`.
    ///
    /// # Panics
    /// This constructor panics if `start` is greater than `end`.
    #[inline]
    pub fn new(start: Addr, end: Addr) -> Self {
        assert!(start <= end, "invalid address range: {start:#x} > {end:#x}");
        Self { start, end }
    }

    /// Create a new [`AddressRange`] starting at `start` and covering
    /// `size` bytes.
    ///
    /// # Panics
    /// This constructor panics if the range would wrap around the end of
    /// the address space.
    #[inline]
    pub fn from_start_and_size(start: Addr, size: u64) -> Self {
        let end = start
            .checked_add(size)
            .unwrap_or_else(|| panic!("address range {start:#x}+{size:#x} overflows"));
        Self::new(start, end)
    }

    /// The range covering the entire address space.
    #[inline]
    pub const fn max() -> Self {
        Self {
            start: 0,
            end: Addr::MAX,
        }
    }

    /// The first address covered by the range.
    #[inline]
    pub const fn start(&self) -> Addr {
        self.start
    }

    /// The first address past the range.
    #[inline]
    pub const fn end(&self) -> Addr {
        self.end
    }

    /// The number of bytes covered.
    #[inline]
    pub const fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Check whether the range covers no addresses at all.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether `addr` falls into this range.
    #[inline]
    pub const fn contains(&self, addr: Addr) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Check whether `other` is fully covered by this range.
    #[inline]
    pub const fn contains_range(&self, other: &AddressRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check whether this range and `other` share at least one address.
    #[inline]
    pub const fn overlaps(&self, other: &AddressRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

impl From<Range<Addr>> for AddressRange {
    #[inline]
    fn from(range: Range<Addr>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}


/// An associative container mapping non-overlapping address ranges to
/// values.
///
/// Entries are kept sorted by range start. Because ranges never
/// overlap, their ends are sorted as well, which makes point lookups
/// logarithmic and overlap enumeration logarithmic plus linear in the
/// number of overlapping entries.
#[derive(Clone, Debug)]
pub struct AddressRangeMap<V> {
    entries: Vec<(AddressRange, V)>,
}

impl<V> AddressRangeMap<V> {
    /// Create a new, empty map.
    #[inline]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Find the entry whose range contains `addr`.
    pub fn find(&self, addr: Addr) -> Option<(&AddressRange, &V)> {
        let idx = find_match_or_lower_bound_by_key(&self.entries, addr, |(range, _)| range.start)?;
        let (range, value) = self.entries.get(idx)?;
        range.contains(addr).then_some((range, value))
    }

    /// Retrieve the index of the first entry that may overlap with a range
    /// starting at `start`.
    #[inline]
    fn first_candidate(&self, start: Addr) -> usize {
        self.entries.partition_point(|(range, _)| range.end <= start)
    }

    /// Iterate over all entries intersecting `range`, in address order.
    pub fn overlaps(&self, range: AddressRange) -> impl Iterator<Item = (&AddressRange, &V)> {
        let idx = self.first_candidate(range.start);
        self.entries[idx..]
            .iter()
            .take_while(move |(entry, _)| entry.overlaps(&range))
            .map(|(entry, value)| (entry, value))
    }

    /// Invoke `f` for every entry intersecting `range`, in address order.
    pub fn for_each_overlap<F>(&self, range: AddressRange, mut f: F)
    where
        F: FnMut(&AddressRange, &V),
    {
        self.overlaps(range)
            .for_each(|(entry, value)| f(entry, value))
    }

    /// Insert `value` for `range`.
    ///
    /// Nothing is inserted and `false` is returned if `range` is empty
    /// or overlaps with an existing entry.
    pub fn emplace(&mut self, range: AddressRange, value: V) -> bool {
        if range.is_empty() || self.overlaps(range).next().is_some() {
            return false
        }

        let idx = self
            .entries
            .partition_point(|(entry, _)| entry.start < range.start);
        let () = self.entries.insert(idx, (range, value));
        true
    }

    /// Remove all entries intersecting `range` and insert `value` for it.
    ///
    /// The newest registration always wins. The removed entries are
    /// returned in address order. An empty `range` is never stored.
    pub fn delete_overlaps_and_emplace(
        &mut self,
        range: AddressRange,
        value: V,
    ) -> Vec<(AddressRange, V)> {
        if range.is_empty() {
            return Vec::new()
        }

        let idx = self.first_candidate(range.start);
        let count = self.entries[idx..]
            .iter()
            .take_while(|(entry, _)| entry.overlaps(&range))
            .count();
        let removed = self
            .entries
            .splice(idx..idx + count, [(range, value)])
            .collect();
        removed
    }

    /// Iterate over all entries, in address order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&AddressRange, &V)> {
        self.entries.iter().map(|(range, value)| (range, value))
    }

    /// Retrieve the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for AddressRangeMap<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<'map, V> IntoIterator for &'map AddressRangeMap<V> {
    type Item = &'map (AddressRange, V);
    type IntoIter = slice::Iter<'map, (AddressRange, V)>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
