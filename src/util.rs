use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::LowerHex;
use std::fmt::Result as FmtResult;


/// A helper for formatting a slice of values as hexadecimal in `Debug`
/// output.
pub(crate) struct Hexify<T>(pub T);

impl<T> Debug for Hexify<&[T]>
where
    T: LowerHex,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut list = f.debug_list();
        for value in self.0 {
            let _list = list.entry(&format_args!("{value:#x}"));
        }
        list.finish()
    }
}


/// Perform a binary search on a slice sorted by the key `f` extracts,
/// returning the index of the match (if found) or the one of the previous
/// item (if any), taking into account duplicates.
///
/// This is what range lookups need: an address can be covered by a range
/// whose start lies before the address.
pub(crate) fn find_match_or_lower_bound_by_key<T, U, F>(
    slice: &[T],
    item: U,
    mut f: F,
) -> Option<usize>
where
    U: Ord,
    F: FnMut(&T) -> U,
{
    let idx = slice.partition_point(|e| f(e) < item);

    // At this point `idx` references the first item greater or equal to the one
    // we are looking for.

    if let Some(e) = slice.get(idx) {
        // If the item at `idx` is equal to what we were looking for, we are
        // trivially done, as it's guaranteed to be the first one to match.
        if f(e) == item {
            return Some(idx)
        }
    }

    // Otherwise `idx` points to a "greater" item. Hence, we pick the previous
    // one, but then have to scan backwards for as long as we see this one item,
    // so that we end up reporting the index of the first of all equal ones.
    let idx = idx.checked_sub(1)?;
    let cmp_e = f(slice.get(idx)?);

    for i in (0..idx).rev() {
        let e = slice.get(i)?;
        if f(e) != cmp_e {
            return Some(i + 1)
        }
    }
    Some(idx)
}

/// Compute the base two logarithm of a row count, as used for cost
/// estimates of binary searches.
#[inline]
pub(crate) fn log2(count: u32) -> f64 {
    f64::from(count).log2()
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Exercise the `Debug` representation of `Hexify`.
    #[test]
    fn hexify_debug() {
        let addrs = [0x10u64, 0xdead];
        assert_eq!(format!("{:?}", Hexify(addrs.as_slice())), "[0x10, 0xdead]");
    }

    /// Check that we find the entry starting at or before an address.
    #[test]
    fn search_lower_bound() {
        let start = |(start, _name): &(u64, &str)| *start;

        let entries: [(u64, &str); 0] = [];
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0, start), None);

        let entries = [(0x1000, "a")];
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0xfff, start), None);
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x1000, start), Some(0));
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x1001, start), Some(0));

        // Among entries with the same key the first one is reported.
        let entries = [(0x1000, "a"), (0x2000, "b"), (0x2000, "c"), (0x2000, "d")];
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x2000, start), Some(1));
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x2800, start), Some(1));
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x1fff, start), Some(0));

        let entries = [(0x1000, "a"), (0x4000, "b"), (0x42000, "c"), (0x99000, "d")];
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0, start), None);
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x5000, start), Some(1));
        assert_eq!(find_match_or_lower_bound_by_key(&entries, 0x98fff, start), Some(2));
        assert_eq!(find_match_or_lower_bound_by_key(&entries, u64::MAX, start), Some(3));
    }

    /// Check that our logarithm helper behaves for small counts.
    #[test]
    fn log2_counts() {
        assert_eq!(log2(1), 0.0);
        assert_eq!(log2(2), 1.0);
        assert_eq!(log2(1024), 10.0);
    }
}
