use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, Result};
use crate::storage::page::{
    FixedCodec, HashTableBucketPage, HashTableDirectoryPage, HashTableHeaderPage,
};

use super::KeyComparator;

/// Hashes a key with the standard library's SipHash and keeps the low 32 bits.
pub fn default_hash<K: Hash>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as u32
}

/// A persistent extendible hash index stored entirely in buffer pool pages.
///
/// The structure is three levels deep: one header page picks a directory by the
/// top bits of the key's hash, the directory picks a bucket by the low bits, and
/// the bucket holds the `(K, V)` pairs. Keys are unique.
///
/// Lookups hold read guards from the header down; inserts and removals hold write
/// guards from the header down, so writers are serialized per table. A write needs
/// up to four pages pinned at once.
pub struct DiskExtendibleHashTable<K, V, C> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    cmp: C,
    hash_fn: fn(&K) -> u32,
    directory_max_depth: u32,
    bucket_max_size: u32,
    header_page_id: PageId,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C> DiskExtendibleHashTable<K, V, C>
where
    K: FixedCodec + Hash,
    V: FixedCodec,
    C: KeyComparator<K>,
{
    /// Creates an empty table and allocates its header page.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        Self::with_hash_fn(
            name,
            bpm,
            cmp,
            default_hash::<K>,
            header_max_depth,
            directory_max_depth,
            bucket_max_size,
        )
    }
}

impl<K, V, C> DiskExtendibleHashTable<K, V, C>
where
    K: FixedCodec,
    V: FixedCodec,
    C: KeyComparator<K>,
{
    /// Like `new`, with a caller-supplied hash function.
    pub fn with_hash_fn(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hash_fn: fn(&K) -> u32,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        let header_page_id = {
            let mut guard = bpm.new_page_guarded()?.upgrade_write();
            HashTableHeaderPage::new(guard.data_mut()).init(header_max_depth);
            guard.page_id()
        };

        let index_name = name.into();
        debug!("created hash table {} with header {}", index_name, header_page_id);

        Ok(Self {
            index_name,
            bpm,
            cmp,
            hash_fn,
            directory_max_depth,
            bucket_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Returns the value stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let hash = (self.hash_fn)(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::new(header_guard.data());
        let directory_page_id =
            header.directory_page_id(header.hash_to_directory_index(u64::from(hash)));
        if !directory_page_id.is_valid() {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        let directory = HashTableDirectoryPage::new(directory_guard.data());
        let bucket_page_id = directory.bucket_page_id(directory.hash_to_bucket_index(hash));
        if !bucket_page_id.is_valid() {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data());
        Ok(bucket.lookup(key, &self.cmp))
    }

    /// Inserts `(key, value)`, splitting buckets and growing the directory as needed.
    /// Returns false if the key is already present or its bucket is full and cannot
    /// split because the directory is at its max depth.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let hash = (self.hash_fn)(key);

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let (directory_idx, mut directory_page_id) = {
            let header = HashTableHeaderPage::new(header_guard.data());
            let idx = header.hash_to_directory_index(u64::from(hash));
            (idx, header.directory_page_id(idx))
        };

        if !directory_page_id.is_valid() {
            directory_page_id = self.new_directory()?;
            HashTableHeaderPage::new(header_guard.data_mut())
                .set_directory_page_id(directory_idx, directory_page_id);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;

        loop {
            let directory = HashTableDirectoryPage::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let local_depth = directory.local_depth(bucket_idx);
            let global_depth = directory.global_depth();
            let max_depth = directory.max_depth();

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data());
            if bucket.lookup(key, &self.cmp).is_some() {
                return Ok(false);
            }
            if !bucket.is_full() {
                return Ok(HashTableBucketPage::<_, K, V>::new(bucket_guard.data_mut())
                    .insert(key, value, &self.cmp));
            }

            if local_depth == global_depth {
                if global_depth >= max_depth {
                    warn!(
                        "{}: bucket {} is full at max depth {}",
                        self.index_name, bucket_page_id, max_depth
                    );
                    return Ok(false);
                }
                HashTableDirectoryPage::new(directory_guard.data_mut()).incr_global_depth();
            }

            self.split_bucket(&mut directory_guard, bucket_idx, &mut bucket_guard)?;
        }
    }

    /// Removes `key`. An emptied bucket is merged with its split image and the
    /// directory shrinks while it can. Returns false if the key was not present.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let hash = (self.hash_fn)(key);

        let header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let directory_page_id = {
            let header = HashTableHeaderPage::new(header_guard.data());
            header.directory_page_id(header.hash_to_directory_index(u64::from(hash)))
        };
        if !directory_page_id.is_valid() {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let (bucket_idx, bucket_page_id) = {
            let directory = HashTableDirectoryPage::new(directory_guard.data());
            let idx = directory.hash_to_bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
        if HashTableBucketPage::<_, K, V>::new(bucket_guard.data())
            .lookup(key, &self.cmp)
            .is_none()
        {
            return Ok(false);
        }

        let mut bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data_mut());
        bucket.remove(key, &self.cmp);
        let now_empty = bucket.is_empty();
        drop(bucket_guard);

        if now_empty {
            self.merge_buckets(&mut directory_guard, bucket_idx)?;
        }
        drop(header_guard);
        Ok(true)
    }

    /// Checks every directory of the table. Panics on a violated invariant.
    pub fn verify_integrity(&self) -> Result<()> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::new(header_guard.data());

        for idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(idx);
            if directory_page_id.is_valid() {
                let guard = self.bpm.fetch_page_read(directory_page_id)?;
                HashTableDirectoryPage::new(guard.data()).verify_integrity();
            }
        }
        Ok(())
    }

    /// Allocates a directory at global depth 0 whose only slot points at a fresh bucket.
    fn new_directory(&self) -> Result<PageId> {
        let bucket_page_id = self.new_bucket()?.page_id();

        let mut guard = self.bpm.new_page_guarded()?.upgrade_write();
        let mut directory = HashTableDirectoryPage::new(guard.data_mut());
        directory.init(self.directory_max_depth);
        directory.set_bucket_page_id(0, bucket_page_id);
        directory.set_local_depth(0, 0);
        Ok(guard.page_id())
    }

    fn new_bucket(&self) -> Result<WritePageGuard> {
        let mut guard = self.bpm.new_page_guarded()?.upgrade_write();
        HashTableBucketPage::<_, K, V>::new(guard.data_mut()).init(self.bucket_max_size);
        Ok(guard)
    }

    /// Splits the full bucket behind `bucket_idx` in two, one local depth deeper.
    /// The global depth must already exceed the bucket's local depth.
    fn split_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_idx: u32,
        bucket_guard: &mut WritePageGuard,
    ) -> Result<()> {
        let mut image_guard = self.new_bucket()?;
        let image_page_id = image_guard.page_id();

        let mut directory = HashTableDirectoryPage::new(directory_guard.data_mut());
        let bucket_page_id = directory.bucket_page_id(bucket_idx);
        let local_depth = directory.local_depth(bucket_idx);
        let split_bit = 1u32 << local_depth;

        for idx in 0..directory.size() {
            if directory.bucket_page_id(idx) == bucket_page_id {
                if idx & split_bit != 0 {
                    directory.set_bucket_page_id(idx, image_page_id);
                }
                directory.set_local_depth(idx, (local_depth + 1) as u8);
            }
        }

        let mut bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data_mut());
        let entries: Vec<(K, V)> = (0..bucket.size()).map(|i| bucket.entry_at(i)).collect();
        bucket.init(self.bucket_max_size);

        let mut image = HashTableBucketPage::<_, K, V>::new(image_guard.data_mut());
        for (key, value) in &entries {
            if (self.hash_fn)(key) & split_bit != 0 {
                image.insert(key, value, &self.cmp);
            } else {
                bucket.insert(key, value, &self.cmp);
            }
        }

        debug!(
            "{}: split {} into {} at local depth {}",
            self.index_name,
            bucket_page_id,
            image_page_id,
            local_depth + 1
        );
        Ok(())
    }

    /// Folds the bucket at `bucket_idx` into its split image while either of the
    /// two is empty and both sit at the same local depth, then shrinks the directory.
    fn merge_buckets(
        &self,
        directory_guard: &mut WritePageGuard,
        mut bucket_idx: u32,
    ) -> Result<()> {
        loop {
            let directory = HashTableDirectoryPage::new(directory_guard.data());
            let local_depth = directory.local_depth(bucket_idx);
            if local_depth == 0 {
                break;
            }

            let image_idx = directory.split_image_index(bucket_idx);
            if directory.local_depth(image_idx) != local_depth {
                break;
            }

            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let image_page_id = directory.bucket_page_id(image_idx);
            let (keep, discard) = if self.bucket_is_empty(bucket_page_id)? {
                (image_page_id, bucket_page_id)
            } else if self.bucket_is_empty(image_page_id)? {
                (bucket_page_id, image_page_id)
            } else {
                break;
            };

            let mut directory = HashTableDirectoryPage::new(directory_guard.data_mut());
            for idx in 0..directory.size() {
                let page_id = directory.bucket_page_id(idx);
                if page_id == bucket_page_id || page_id == image_page_id {
                    directory.set_bucket_page_id(idx, keep);
                    directory.set_local_depth(idx, (local_depth - 1) as u8);
                }
            }

            if !self.bpm.delete_page(discard)? {
                warn!("{}: merged bucket {} is still pinned", self.index_name, discard);
            }
            debug!(
                "{}: merged {} into {} at local depth {}",
                self.index_name,
                discard,
                keep,
                local_depth - 1
            );

            while directory.global_depth() > 1 && directory.can_shrink() {
                directory.decr_global_depth();
            }
            bucket_idx &= directory.global_depth_mask();
        }
        Ok(())
    }

    fn bucket_is_empty(&self, bucket_page_id: PageId) -> Result<bool> {
        let guard = self.bpm.fetch_page_read(bucket_page_id)?;
        Ok(HashTableBucketPage::<_, K, V>::new(guard.data()).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::OrdComparator;
    use crate::storage::disk::MemoryDiskManager;

    fn identity(key: &u32) -> u32 {
        *key
    }

    fn create_table(
        pool_size: usize,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> DiskExtendibleHashTable<u32, u32, OrdComparator> {
        let bpm = Arc::new(BufferPoolManager::new(
            pool_size,
            Arc::new(MemoryDiskManager::default()),
        ));
        DiskExtendibleHashTable::with_hash_fn(
            "test",
            bpm,
            OrdComparator,
            identity,
            0,
            directory_max_depth,
            bucket_max_size,
        )
        .unwrap()
    }

    fn directory_depths(
        table: &DiskExtendibleHashTable<u32, u32, OrdComparator>,
    ) -> (u32, Vec<u32>) {
        let header_guard = table.bpm.fetch_page_read(table.header_page_id()).unwrap();
        let directory_page_id = HashTableHeaderPage::new(header_guard.data()).directory_page_id(0);
        let guard = table.bpm.fetch_page_read(directory_page_id).unwrap();
        let directory = HashTableDirectoryPage::new(guard.data());
        let local_depths = (0..directory.size()).map(|i| directory.local_depth(i)).collect();
        (directory.global_depth(), local_depths)
    }

    #[test]
    fn test_hash_table_empty_lookup() {
        let table = create_table(8, 2, 2);
        assert_eq!(table.get_value(&1).unwrap(), None);
        assert!(!table.remove(&1).unwrap());
        table.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_table_split_grows_directory() {
        let table = create_table(8, 3, 2);

        for key in [0u32, 4] {
            assert!(table.insert(&key, &(key * 10)).unwrap());
        }
        assert_eq!(directory_depths(&table), (0, vec![0]));

        // 0, 4 and 1 cannot share a bucket: splits on bit 0
        assert!(table.insert(&1, &10).unwrap());
        assert_eq!(directory_depths(&table), (1, vec![1, 1]));

        // 0, 4 and 2 all have bit 0 clear; bit 1 moves 2 into its own bucket
        assert!(table.insert(&2, &20).unwrap());
        let (global_depth, _) = directory_depths(&table);
        assert_eq!(global_depth, 2);
        table.verify_integrity().unwrap();

        for key in [0u32, 4, 1, 2] {
            assert_eq!(table.get_value(&key).unwrap(), Some(key * 10));
        }
    }

    #[test]
    fn test_hash_table_rejects_duplicates() {
        let table = create_table(8, 2, 4);
        assert!(table.insert(&5, &1).unwrap());
        assert!(!table.insert(&5, &2).unwrap());
        assert_eq!(table.get_value(&5).unwrap(), Some(1));
    }

    #[test]
    fn test_hash_table_full_at_max_depth() {
        let table = create_table(8, 1, 1);
        assert!(table.insert(&0, &0).unwrap());
        assert!(table.insert(&1, &1).unwrap());
        // 2 collides with 0 on bit 0 and the directory cannot grow past depth 1
        assert!(!table.insert(&2, &2).unwrap());
        table.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_table_merge_shrinks_directory() {
        let table = create_table(8, 3, 2);
        for key in [0u32, 4, 1, 2] {
            assert!(table.insert(&key, &key).unwrap());
        }

        assert!(table.remove(&2).unwrap());
        assert!(table.remove(&4).unwrap());
        table.verify_integrity().unwrap();
        let (global_depth, local_depths) = directory_depths(&table);
        assert_eq!(global_depth, 1);
        assert_eq!(local_depths, vec![1, 1]);

        assert!(table.remove(&1).unwrap());
        let (global_depth, local_depths) = directory_depths(&table);
        assert_eq!(global_depth, 1);
        assert_eq!(local_depths, vec![0, 0]);
        table.verify_integrity().unwrap();

        assert_eq!(table.get_value(&0).unwrap(), Some(0));
        assert!(!table.remove(&4).unwrap());
    }
}
