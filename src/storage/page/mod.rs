mod codec;
mod hash_table_bucket_page;
mod hash_table_directory_page;
mod hash_table_header_page;
mod page;

pub use codec::*;
pub use hash_table_bucket_page::*;
pub use hash_table_directory_page::*;
pub use hash_table_header_page::*;
pub use page::*;
