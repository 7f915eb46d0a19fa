//! Directory page of a disk extendible hash table.
//!
//! Layout:
//! ```text
//! | MaxDepth (4) | GlobalDepth (4) | LocalDepths (512) | BucketPageIds (2048) | Free (1528) |
//! ```
//! Only the first `2^global_depth` slots are live. A bucket with local depth `ld`
//! is referenced by exactly `2^(global_depth - ld)` slots.

use std::collections::HashMap;

use crate::common::{
    PageId, PoolError, Result, HTABLE_DIRECTORY_ARRAY_SIZE, HTABLE_DIRECTORY_MAX_DEPTH,
    INVALID_PAGE_ID, PAGE_SIZE,
};

use super::FixedCodec;

const MAX_DEPTH_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + HTABLE_DIRECTORY_ARRAY_SIZE;

/// View over a page's bytes laid out as a hash table directory.
pub struct HashTableDirectoryPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashTableDirectoryPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Returns the directory slot a hash maps to: its low `global_depth` bits.
    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        self.check_slot(bucket_idx);
        let offset = BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4;
        PageId::decode(&self.bytes()[offset..offset + 4])
    }

    /// Returns the slot that shares all but the highest local-depth bit with `bucket_idx`.
    /// A bucket at local depth 0 is its own split image.
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        match self.local_depth(bucket_idx) {
            0 => bucket_idx,
            local_depth => bucket_idx ^ (1 << (local_depth - 1)),
        }
    }

    /// Mask with `global_depth` ones counted from the least significant bit.
    pub fn global_depth_mask(&self) -> u32 {
        depth_mask(self.global_depth())
    }

    /// Mask with `local_depth(bucket_idx)` ones counted from the least significant bit.
    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        depth_mask(self.local_depth(bucket_idx))
    }

    pub fn global_depth(&self) -> u32 {
        u32::decode(&self.bytes()[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4])
    }

    pub fn max_depth(&self) -> u32 {
        u32::decode(&self.bytes()[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4])
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        self.check_slot(bucket_idx);
        self.bytes()[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] as u32
    }

    /// The directory can shrink only if every live slot's local depth is
    /// strictly below the global depth.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        global_depth > 0 && (0..self.size()).all(|idx| self.local_depth(idx) < global_depth)
    }

    /// Number of live slots.
    pub fn size(&self) -> u32 {
        1 << self.global_depth()
    }

    /// Number of slots the directory can grow to.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    /// Checks the directory invariants over the live slots:
    /// every local depth is at most the global depth, every bucket is referenced
    /// by exactly `2^(global_depth - local_depth)` slots, and all slots referencing
    /// one bucket agree on its local depth.
    pub fn check_integrity(&self) -> Result<()> {
        let global_depth = self.global_depth();
        // bucket page id -> (local depth, reference count)
        let mut buckets: HashMap<PageId, (u32, u32)> = HashMap::new();

        for idx in 0..self.size() {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx);

            if local_depth > global_depth {
                return Err(PoolError::IntegrityViolation(format!(
                    "slot {idx}: local depth {local_depth} exceeds global depth {global_depth}"
                )));
            }

            let entry = buckets.entry(page_id).or_insert((local_depth, 0));
            if entry.0 != local_depth {
                return Err(PoolError::IntegrityViolation(format!(
                    "slot {idx}: {page_id} has local depth {local_depth}, other slots say {}",
                    entry.0
                )));
            }
            entry.1 += 1;
        }

        for (page_id, (local_depth, count)) in buckets {
            let expected = 1u32 << (global_depth - local_depth);
            if count != expected {
                return Err(PoolError::IntegrityViolation(format!(
                    "{page_id} at local depth {local_depth} is referenced by {count} slots, expected {expected}"
                )));
            }
        }

        Ok(())
    }

    /// Like `check_integrity`, but a violation is fatal.
    pub fn verify_integrity(&self) {
        if let Err(e) = self.check_integrity() {
            panic!("{e}");
        }
    }

    fn check_slot(&self, bucket_idx: u32) {
        assert!(
            (bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE && bucket_idx < self.max_size(),
            "bucket index {bucket_idx} out of range"
        );
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Must be called on a freshly allocated page before any other method.
    /// Starts with a single slot (global depth 0) pointing at no bucket.
    pub fn init(&mut self, max_depth: u32) {
        assert!(
            max_depth <= HTABLE_DIRECTORY_MAX_DEPTH,
            "directory max depth {max_depth} exceeds {HTABLE_DIRECTORY_MAX_DEPTH}"
        );
        max_depth.encode(&mut self.bytes_mut()[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]);
        self.set_global_depth(0);
        for idx in 0..HTABLE_DIRECTORY_ARRAY_SIZE {
            self.clear_slot(idx);
        }
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        self.check_slot(bucket_idx);
        let offset = BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4;
        bucket_page_id.encode(&mut self.bytes_mut()[offset..offset + 4]);
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        self.check_slot(bucket_idx);
        self.bytes_mut()[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        let local_depth = self.local_depth(bucket_idx);
        assert!(
            local_depth < self.global_depth(),
            "local depth of slot {bucket_idx} would exceed the global depth"
        );
        self.set_local_depth(bucket_idx, (local_depth + 1) as u8);
    }

    /// Decrements the local depth of a slot; a depth of zero is left alone.
    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        let local_depth = self.local_depth(bucket_idx);
        if local_depth > 0 {
            self.set_local_depth(bucket_idx, (local_depth - 1) as u8);
        }
    }

    /// Doubles the live slot range. Each new upper slot starts as a copy of its
    /// lower-half twin, so existing buckets stay reachable.
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        assert!(
            global_depth < self.max_depth(),
            "global depth would exceed max depth {}",
            self.max_depth()
        );

        let size = self.size();
        for idx in 0..size {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx) as u8;
            self.set_bucket_page_id(idx + size, page_id);
            self.set_local_depth(idx + size, local_depth);
        }
        self.set_global_depth(global_depth + 1);
    }

    /// Halves the live slot range and clears the slots that fall out of it.
    /// The directory never shrinks below global depth 1.
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        assert!(global_depth > 1, "global depth must stay above zero");

        let new_size = 1u32 << (global_depth - 1);
        for idx in new_size..self.size() {
            self.clear_slot(idx as usize);
        }
        self.set_global_depth(global_depth - 1);
    }

    fn set_global_depth(&mut self, global_depth: u32) {
        global_depth.encode(&mut self.bytes_mut()[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]);
    }

    fn clear_slot(&mut self, idx: usize) {
        let bytes = self.bytes_mut();
        bytes[LOCAL_DEPTHS_OFFSET + idx] = 0;
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        INVALID_PAGE_ID.encode(&mut bytes[offset..offset + 4]);
    }
}

fn depth_mask(depth: u32) -> u32 {
    match depth {
        0 => 0,
        d if d >= u32::BITS => u32::MAX,
        d => (1 << d) - 1,
    }
}
