//! Header page of a disk extendible hash table.
//!
//! Layout:
//! ```text
//! | DirectoryPageIds (2048) | MaxDepth (4) | Free (2044) |
//! ```
//! The header never grows: it addresses `2^max_depth` directories by the top
//! `max_depth` bits of a key's 32-bit hash.

use crate::common::{
    PageId, HTABLE_HEADER_ARRAY_SIZE, HTABLE_HEADER_MAX_DEPTH, INVALID_PAGE_ID, PAGE_SIZE,
};

use super::FixedCodec;

const DIRECTORY_PAGE_IDS_OFFSET: usize = 0;
const MAX_DEPTH_OFFSET: usize = DIRECTORY_PAGE_IDS_OFFSET + HTABLE_HEADER_ARRAY_SIZE * 4;

/// View over a page's bytes laid out as a hash table header.
/// `B` is `&[u8]` for read-only access or `&mut [u8]` for updates.
pub struct HashTableHeaderPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashTableHeaderPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::decode(&self.data.as_ref()[offset..offset + 4])
    }

    /// Returns the directory index the hash maps to.
    /// 64-bit hashes are truncated to their low 32 bits first.
    pub fn hash_to_directory_index(&self, hash: u64) -> u32 {
        let hash = hash as u32;
        match self.max_depth() {
            0 => 0,
            depth => hash >> (u32::BITS - depth),
        }
    }

    pub fn directory_page_id(&self, directory_idx: u32) -> PageId {
        assert!(directory_idx < self.max_size(), "directory index out of range");
        PageId::decode(&self.data.as_ref()[Self::slot_offset(directory_idx)..][..4])
    }

    pub fn max_depth(&self) -> u32 {
        self.read_u32(MAX_DEPTH_OFFSET)
    }

    /// Maximum number of directory page ids the header can hold.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    fn slot_offset(directory_idx: u32) -> usize {
        DIRECTORY_PAGE_IDS_OFFSET + directory_idx as usize * 4
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableHeaderPage<B> {
    /// Must be called on a freshly allocated page before any other method.
    pub fn init(&mut self, max_depth: u32) {
        assert!(
            max_depth <= HTABLE_HEADER_MAX_DEPTH,
            "header max depth {max_depth} exceeds {HTABLE_HEADER_MAX_DEPTH}"
        );
        max_depth.encode(&mut self.data.as_mut()[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]);
        for idx in 0..HTABLE_HEADER_ARRAY_SIZE as u32 {
            INVALID_PAGE_ID.encode(&mut self.data.as_mut()[Self::slot_offset(idx)..][..4]);
        }
    }

    pub fn set_directory_page_id(&mut self, directory_idx: u32, directory_page_id: PageId) {
        assert!(directory_idx < self.max_size(), "directory index out of range");
        directory_page_id.encode(&mut self.data.as_mut()[Self::slot_offset(directory_idx)..][..4]);
    }
}
