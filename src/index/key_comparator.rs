use std::cmp::Ordering;

/// Three-way key comparison used by hash bucket lookups.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Compares keys by their natural `Ord` order (integers, page ids, byte arrays).
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Compares fixed-width byte keys as little-endian unsigned integers
/// of their first four bytes, falling back to bytewise order on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerPrefixComparator;

impl<const N: usize> KeyComparator<[u8; N]> for IntegerPrefixComparator {
    fn compare(&self, a: &[u8; N], b: &[u8; N]) -> Ordering {
        if N < 4 {
            return a.cmp(b);
        }

        let a_val = u32::from_le_bytes([a[0], a[1], a[2], a[3]]);
        let b_val = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);

        a_val.cmp(&b_val).then_with(|| a.cmp(b))
    }
}
