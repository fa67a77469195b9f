//! Key ordering strategies.
//!
//! A namespace's key order is fixed when the namespace is created. Point
//! lookups, `seek`, `seek_first`, `seek_last` and iteration direction all
//! follow the installed [`KeyComparator`], never raw byte order.

use std::cmp::Ordering;

/// A total order over raw byte keys.
///
/// Comparators are stateless strategy types: an engine is parameterised by
/// its comparator, which is installed into the namespace before any data is
/// written. [`NAME`](Self::NAME) is persisted alongside the namespace and
/// checked on every reopen, so the same data is never read back under a
/// different order.
pub trait KeyComparator: Send + Sync + 'static {
    /// Stable identifier stored with the namespace.
    const NAME: &'static str;

    /// Compare two keys.
    fn compare(a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    const NAME: &'static str = "kvbridge.bytewise";

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Reverse lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseBytewiseComparator;

impl KeyComparator for ReverseBytewiseComparator {
    const NAME: &'static str = "kvbridge.reverse_bytewise";

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_order() {
        assert_eq!(BytewiseComparator::compare(b"a", b"b"), Ordering::Less);
        assert_eq!(BytewiseComparator::compare(b"ab", b"a"), Ordering::Greater);
        assert_eq!(BytewiseComparator::compare(b"", b""), Ordering::Equal);
    }

    #[test]
    fn test_reverse_order() {
        assert_eq!(ReverseBytewiseComparator::compare(b"a", b"b"), Ordering::Greater);
        assert_eq!(ReverseBytewiseComparator::compare(b"b", b"a"), Ordering::Less);
        assert_eq!(ReverseBytewiseComparator::compare(b"k", b"k"), Ordering::Equal);
    }

    #[test]
    fn test_names_are_distinct() {
        assert_ne!(BytewiseComparator::NAME, ReverseBytewiseComparator::NAME);
    }
}
