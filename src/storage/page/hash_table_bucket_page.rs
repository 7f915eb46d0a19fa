//! Bucket page of a disk extendible hash table.
//!
//! Layout:
//! ```text
//! | Size (4) | MaxSize (4) | (Key, Value) entries ... |
//! ```
//! Entries are packed contiguously with no gaps; removal shifts later entries left.

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::common::{HTABLE_BUCKET_PAGE_METADATA_SIZE, PAGE_SIZE};
use crate::index::KeyComparator;

use super::FixedCodec;

const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = HTABLE_BUCKET_PAGE_METADATA_SIZE;

/// Number of `(K, V)` entries that fit in one bucket page.
pub const fn bucket_array_size<K: FixedCodec, V: FixedCodec>() -> usize {
    (PAGE_SIZE - HTABLE_BUCKET_PAGE_METADATA_SIZE) / (K::ENCODED_SIZE + V::ENCODED_SIZE)
}

/// View over a page's bytes laid out as a bucket of `(K, V)` pairs.
pub struct HashTableBucketPage<B, K, V> {
    data: B,
    _marker: PhantomData<(K, V)>,
}

impl<B, K, V> HashTableBucketPage<B, K, V>
where
    B: AsRef<[u8]>,
    K: FixedCodec,
    V: FixedCodec,
{
    const ENTRY_SIZE: usize = K::ENCODED_SIZE + V::ENCODED_SIZE;

    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn entry_offset(idx: u32) -> usize {
        ENTRIES_OFFSET + idx as usize * Self::ENTRY_SIZE
    }

    /// Returns the value stored under `key`, if any.
    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Option<V> {
        self.position(key, cmp).map(|idx| self.value_at(idx))
    }

    pub fn key_at(&self, bucket_idx: u32) -> K {
        assert!(bucket_idx < self.size(), "bucket index {bucket_idx} out of range");
        let offset = Self::entry_offset(bucket_idx);
        K::decode(&self.bytes()[offset..offset + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, bucket_idx: u32) -> V {
        assert!(bucket_idx < self.size(), "bucket index {bucket_idx} out of range");
        let offset = Self::entry_offset(bucket_idx) + K::ENCODED_SIZE;
        V::decode(&self.bytes()[offset..offset + V::ENCODED_SIZE])
    }

    pub fn entry_at(&self, bucket_idx: u32) -> (K, V) {
        (self.key_at(bucket_idx), self.value_at(bucket_idx))
    }

    pub fn size(&self) -> u32 {
        u32::decode(&self.bytes()[SIZE_OFFSET..SIZE_OFFSET + 4])
    }

    pub fn max_size(&self) -> u32 {
        u32::decode(&self.bytes()[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4])
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn position<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Option<u32> {
        (0..self.size()).find(|&idx| cmp.compare(&self.key_at(idx), key) == Ordering::Equal)
    }
}

impl<B, K, V> HashTableBucketPage<B, K, V>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    K: FixedCodec,
    V: FixedCodec,
{
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Must be called on a freshly allocated page before any other method.
    /// `max_size` is capped at the number of entries that physically fit.
    pub fn init(&mut self, max_size: u32) {
        let capacity = bucket_array_size::<K, V>() as u32;
        let max_size = max_size.min(capacity);
        self.set_size(0);
        max_size.encode(&mut self.bytes_mut()[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4]);
    }

    /// Appends `(key, value)`. Fails if the bucket is full or `key` is already present.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        if self.is_full() || self.position(key, cmp).is_some() {
            return false;
        }

        let size = self.size();
        let offset = Self::entry_offset(size);
        let bytes = self.bytes_mut();
        key.encode(&mut bytes[offset..offset + K::ENCODED_SIZE]);
        value.encode(&mut bytes[offset + K::ENCODED_SIZE..offset + Self::ENTRY_SIZE]);
        self.set_size(size + 1);
        true
    }

    /// Removes the entry for `key`. Returns false if it was not present.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, cmp: &C) -> bool {
        match self.position(key, cmp) {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Removes the entry at `bucket_idx`, shifting every later entry one slot left.
    pub fn remove_at(&mut self, bucket_idx: u32) {
        let size = self.size();
        assert!(bucket_idx < size, "bucket index {bucket_idx} out of range");

        let start = Self::entry_offset(bucket_idx);
        let end = Self::entry_offset(size);
        self.bytes_mut()
            .copy_within(start + Self::ENTRY_SIZE..end, start);
        self.set_size(size - 1);
    }

    fn set_size(&mut self, size: u32) {
        size.encode(&mut self.bytes_mut()[SIZE_OFFSET..SIZE_OFFSET + 4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, RecordId, SlotId};
    use crate::index::OrdComparator;

    #[test]
    fn test_bucket_array_size_is_exact() {
        // 8 bytes of metadata, 8 + 8 per entry
        assert_eq!(bucket_array_size::<u64, u64>(), (4096 - 8) / 16);
        // 4 + 6 per entry
        assert_eq!(bucket_array_size::<u32, RecordId>(), (4096 - 8) / 10);
        let entries_end = ENTRIES_OFFSET + bucket_array_size::<u32, RecordId>() * 10;
        assert!(entries_end <= PAGE_SIZE);
    }

    #[test]
    fn test_bucket_init_caps_max_size() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = HashTableBucketPage::<_, u64, u64>::new(&mut data[..]);
        bucket.init(u32::MAX);
        assert_eq!(bucket.max_size() as usize, bucket_array_size::<u64, u64>());
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_bucket_rejects_duplicate_keys() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = HashTableBucketPage::<_, u32, u32>::new(&mut data[..]);
        bucket.init(4);

        assert!(bucket.insert(&7, &70, &OrdComparator));
        assert!(!bucket.insert(&7, &71, &OrdComparator));
        assert_eq!(bucket.lookup(&7, &OrdComparator), Some(70));
        assert_eq!(bucket.size(), 1);
    }

    #[test]
    fn test_bucket_remove_shifts_entries() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = HashTableBucketPage::<_, u32, RecordId>::new(&mut data[..]);
        bucket.init(8);

        for i in 0..4u32 {
            let rid = RecordId::new(PageId::new(i), SlotId::new(i as u16));
            assert!(bucket.insert(&i, &rid, &OrdComparator));
        }

        assert!(bucket.remove(&1, &OrdComparator));
        assert_eq!(bucket.size(), 3);
        assert_eq!(bucket.key_at(0), 0);
        assert_eq!(bucket.key_at(1), 2);
        assert_eq!(bucket.key_at(2), 3);
        assert_eq!(
            bucket.entry_at(2),
            (3, RecordId::new(PageId::new(3), SlotId::new(3)))
        );
        assert_eq!(bucket.lookup(&1, &OrdComparator), None);
    }

    #[test]
    fn test_bucket_read_only_view() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut bucket = HashTableBucketPage::<_, u16, i64>::new(&mut data[..]);
            bucket.init(2);
            assert!(bucket.insert(&1, &-1, &OrdComparator));
            assert!(bucket.insert(&2, &-2, &OrdComparator));
        }

        let bucket = HashTableBucketPage::<_, u16, i64>::new(&data[..]);
        assert!(bucket.is_full());
        assert_eq!(bucket.lookup(&2, &OrdComparator), Some(-2));
    }
}
