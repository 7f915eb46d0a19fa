use thiserror::Error;

use super::types::PageId;

/// Buffer pool error types
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No frame available: every frame in the buffer pool is pinned")]
    NoFrameAvailable,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is outside the disk manager's capacity")]
    PageOutOfRange(PageId),

    #[error("Disk scheduler has been shut down")]
    SchedulerShutdown,

    #[error("Disk request for {page_id} failed: {reason}")]
    DiskRequestFailed { page_id: PageId, reason: String },

    #[error("Hash directory integrity violated: {0}")]
    IntegrityViolation(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
