mod buffer_pool_manager;
mod lru_replacer;
mod page_guard;

pub use buffer_pool_manager::BufferPoolManager;
pub use lru_replacer::*;
pub use page_guard::*;
