//! Integration tests for the disk extendible hash table

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use pagepool::buffer::BufferPoolManager;
use pagepool::common::{PageId, RecordId, SlotId};
use pagepool::index::{DiskExtendibleHashTable, IntegerPrefixComparator, OrdComparator};
use pagepool::storage::disk::MemoryDiskManager;
use rand::seq::SliceRandom;
use rand::Rng;

fn create_bpm(pool_size: usize) -> Arc<BufferPoolManager> {
    Arc::new(BufferPoolManager::new(
        pool_size,
        Arc::new(MemoryDiskManager::default()),
    ))
}

fn rid_for(key: u32) -> RecordId {
    RecordId::new(PageId::new(key >> 8), SlotId::new((key & 0xff) as u16))
}

#[test]
fn test_hash_table_insert_lookup_remove_random() {
    let bpm = create_bpm(50);
    let table: DiskExtendibleHashTable<u64, u64, _> =
        DiskExtendibleHashTable::new("random", bpm, OrdComparator, 2, 9, 16).unwrap();

    let mut rng = rand::thread_rng();
    let mut keys: Vec<u64> = (0..1000).map(|_| rng.gen()).collect();
    keys.sort_unstable();
    keys.dedup();
    keys.shuffle(&mut rng);

    for &key in &keys {
        assert!(table.insert(&key, &key.wrapping_mul(3)).unwrap());
    }
    table.verify_integrity().unwrap();

    for &key in &keys {
        assert_eq!(table.get_value(&key).unwrap(), Some(key.wrapping_mul(3)));
    }

    let (removed, kept) = keys.split_at(keys.len() / 2);
    for key in removed {
        assert!(table.remove(key).unwrap());
    }
    table.verify_integrity().unwrap();

    for key in removed {
        assert_eq!(table.get_value(key).unwrap(), None);
        assert!(!table.remove(key).unwrap());
    }
    for key in kept {
        assert_eq!(table.get_value(key).unwrap(), Some(key.wrapping_mul(3)));
    }
}

#[test]
fn test_hash_table_duplicate_keys_rejected() {
    let bpm = create_bpm(16);
    let table: DiskExtendibleHashTable<u32, RecordId, _> =
        DiskExtendibleHashTable::new("dups", bpm, OrdComparator, 0, 9, 4).unwrap();

    for key in 0..50u32 {
        assert!(table.insert(&key, &rid_for(key)).unwrap());
    }
    for key in 0..50u32 {
        assert!(!table.insert(&key, &rid_for(key + 1)).unwrap());
        assert_eq!(table.get_value(&key).unwrap(), Some(rid_for(key)));
    }
}

#[test]
fn test_hash_table_grow_then_shrink() {
    let bpm = create_bpm(32);
    let table: DiskExtendibleHashTable<u32, u32, _> =
        DiskExtendibleHashTable::new("cycle", Arc::clone(&bpm), OrdComparator, 0, 9, 8).unwrap();

    for round in 0..3 {
        for key in 0..200u32 {
            assert!(table.insert(&key, &(key + round)).unwrap());
        }
        table.verify_integrity().unwrap();

        for key in 0..200u32 {
            assert!(table.remove(&key).unwrap());
        }
        table.verify_integrity().unwrap();

        for key in 0..200u32 {
            assert_eq!(table.get_value(&key).unwrap(), None);
        }
    }

    // merged buckets were deleted, so the pool does not fill up with empty pages:
    // what is left is the header, one directory and at most two buckets
    let resident = (0..10_000u32)
        .filter(|&id| bpm.get_pin_count(PageId::new(id)).is_some())
        .count();
    assert!(resident <= 4, "{resident} pages still resident");
}

#[test]
fn test_hash_table_tiny_pool_evicts_pages() {
    // a split pins header, directory and two buckets at once
    let bpm = create_bpm(4);
    let table: DiskExtendibleHashTable<u32, RecordId, _> =
        DiskExtendibleHashTable::new("tiny", Arc::clone(&bpm), OrdComparator, 1, 9, 8).unwrap();

    for key in 0..400u32 {
        assert!(table.insert(&key, &rid_for(key)).unwrap());
    }
    assert!(bpm.disk_manager().num_writes() > 0);

    for key in (0..400u32).rev() {
        assert_eq!(table.get_value(&key).unwrap(), Some(rid_for(key)));
    }
    table.verify_integrity().unwrap();

    for key in (0..400u32).step_by(3) {
        assert!(table.remove(&key).unwrap());
    }
    for key in 0..400u32 {
        let expected = (key % 3 != 0).then(|| rid_for(key));
        assert_eq!(table.get_value(&key).unwrap(), expected);
    }
    table.verify_integrity().unwrap();
}

#[test]
fn test_hash_table_full_directory_rejects_insert() {
    let bpm = create_bpm(8);
    // one directory slot, one bucket of two entries, no room to grow
    let table: DiskExtendibleHashTable<u32, u32, _> =
        DiskExtendibleHashTable::new("full", bpm, OrdComparator, 0, 0, 2).unwrap();

    assert!(table.insert(&1, &1).unwrap());
    assert!(table.insert(&2, &2).unwrap());
    assert!(!table.insert(&3, &3).unwrap());
    assert_eq!(table.get_value(&3).unwrap(), None);
    table.verify_integrity().unwrap();
}

#[test]
fn test_hash_table_byte_array_keys() {
    let bpm = create_bpm(16);
    let table: DiskExtendibleHashTable<[u8; 8], u64, _> =
        DiskExtendibleHashTable::new("bytes", bpm, IntegerPrefixComparator, 1, 9, 8).unwrap();

    let key_for = |i: u32| {
        let mut key = [0u8; 8];
        key[..4].copy_from_slice(&i.to_le_bytes());
        key[4..].copy_from_slice(b"pad!");
        key
    };

    for i in 0..100u32 {
        assert!(table.insert(&key_for(i), &u64::from(i)).unwrap());
    }
    for i in 0..100u32 {
        assert_eq!(table.get_value(&key_for(i)).unwrap(), Some(u64::from(i)));
    }
    assert_eq!(table.get_value(&key_for(100)).unwrap(), None);
}

#[test]
fn test_hash_table_concurrent_writers_and_readers() {
    let bpm = create_bpm(64);
    let table: Arc<DiskExtendibleHashTable<u64, u64, _>> = Arc::new(
        DiskExtendibleHashTable::new("concurrent", bpm, OrdComparator, 2, 9, 16).unwrap(),
    );
    let num_threads = 4u64;
    let keys_per_thread = 250u64;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let start = t * keys_per_thread;
                for key in start..start + keys_per_thread {
                    assert!(table.insert(&key, &(key * 2)).unwrap());
                    assert_eq!(table.get_value(&key).unwrap(), Some(key * 2));
                }
                // remove every other key this thread owns
                for key in (start..start + keys_per_thread).step_by(2) {
                    assert!(table.remove(&key).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    table.verify_integrity().unwrap();

    let mut present = HashSet::new();
    for key in 0..num_threads * keys_per_thread {
        if let Some(value) = table.get_value(&key).unwrap() {
            assert_eq!(value, key * 2);
            present.insert(key);
        }
    }
    let expected: HashSet<u64> = (0..num_threads * keys_per_thread)
        .filter(|k| (k % keys_per_thread) % 2 == 1)
        .collect();
    assert_eq!(present, expected);
}
