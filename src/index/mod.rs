mod disk_extendible_hash_table;
mod key_comparator;

pub use disk_extendible_hash_table::{default_hash, DiskExtendibleHashTable};
pub use key_comparator::{IntegerPrefixComparator, KeyComparator, OrdComparator};
