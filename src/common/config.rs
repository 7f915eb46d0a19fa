use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Max depth of the extendible hash header page.
/// 2^9 directory page ids take 2048 bytes.
pub const HTABLE_HEADER_MAX_DEPTH: u32 = 9;

/// Number of directory page id slots in a header page.
pub const HTABLE_HEADER_ARRAY_SIZE: usize = 1 << HTABLE_HEADER_MAX_DEPTH;

/// Max depth of an extendible hash directory page.
/// 1024 bucket ids would leave no room for the local depths, so the array stops at 512.
pub const HTABLE_DIRECTORY_MAX_DEPTH: u32 = 9;

/// Number of bucket slots in a directory page.
pub const HTABLE_DIRECTORY_ARRAY_SIZE: usize = 1 << HTABLE_DIRECTORY_MAX_DEPTH;

/// Bytes reserved at the front of a bucket page for `size` and `max_size`.
pub const HTABLE_BUCKET_PAGE_METADATA_SIZE: usize = 8;

/// Page capacity of `MemoryDiskManager::default()`.
pub const DEFAULT_MEMORY_DISK_PAGES: usize = 1 << 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
    }

    #[test]
    fn test_hash_page_layouts_fit() {
        // directory_page_ids + max_depth
        assert!(HTABLE_HEADER_ARRAY_SIZE * 4 + 4 <= PAGE_SIZE);
        // max_depth + global_depth + local_depths + bucket_page_ids
        assert!(8 + HTABLE_DIRECTORY_ARRAY_SIZE * (1 + 4) <= PAGE_SIZE);
    }
}
