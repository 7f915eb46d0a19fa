use std::sync::Arc;

use pagepool::buffer::BufferPoolManager;
use pagepool::index::{DiskExtendibleHashTable, OrdComparator};
use pagepool::storage::disk::FileDiskManager;
use pagepool::{PageId, RecordId, SlotId};

fn main() -> pagepool::Result<()> {
    println!("Pagepool - buffer pool and extendible hash index");
    println!("================================================\n");

    // Create a temporary database file for demonstration
    let db_path = "demo.db";

    let disk_manager = Arc::new(FileDiskManager::new(db_path)?);
    println!("Created disk manager for: {}", db_path);

    // A small pool so the hash table has to evict
    let bpm = Arc::new(BufferPoolManager::new(8, disk_manager));
    println!("Created buffer pool manager with {} frames\n", bpm.pool_size());

    let table: DiskExtendibleHashTable<u32, RecordId, _> =
        DiskExtendibleHashTable::new("demo_index", Arc::clone(&bpm), OrdComparator, 1, 9, 32)?;
    println!("Created hash table, header at {}", table.header_page_id());

    for key in 0..1000u32 {
        let rid = RecordId::new(PageId::new(key / 100), SlotId::new((key % 100) as u16));
        table.insert(&key, &rid)?;
    }
    println!("Inserted 1000 keys");

    for key in (0..1000u32).step_by(2) {
        table.remove(&key)?;
    }
    println!("Removed the even keys");

    table.verify_integrity()?;
    println!("Directory invariants hold");

    for key in [1u32, 2, 501, 998, 999] {
        println!("  - key {}: {:?}", key, table.get_value(&key)?);
    }

    bpm.flush_all_pages()?;
    println!("\nFlushed all pages to disk");
    println!("  - Disk reads: {}", bpm.disk_manager().num_reads());
    println!("  - Disk writes: {}", bpm.disk_manager().num_writes());

    // Clean up
    drop(table);
    drop(bpm);
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
    Ok(())
}
