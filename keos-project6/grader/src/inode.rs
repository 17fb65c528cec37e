//! Exercises the inode layer: byte-level read/write, growth across the
//! indirect boundary, open-uniqueness, deny-write, sector reclamation on
//! removal, and the `MAX_INODE_LEN` boundary.

use crate::support::BitmapFreeMap;
use alloc::{sync::Arc, vec};
use keos::fs::{Disk, Sector};
use keos_project6::{
    BufferCache, FreeMap, InodeRegistry,
    config::{MAX_INODE_LEN, NUM_DIRECT, NUM_INDIRECT, SECTOR_SIZE},
};

/// A disk index dedicated to inode tests, distinct from the cache and swap
/// test disks.
const DISK: usize = 2;

/// After `create(s, n)`, `open(s)` reports a length of at least `n` and
/// every byte in `[0, n)` reads back zero.
pub fn create_zero_fills_initial_length() {
    let cache = BufferCache::new(Disk::new(DISK));
    let free_map = BitmapFreeMap::new(900, 50);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 64).expect("inode_create");
    let inode = registry.open(&cache, sector).expect("inode_open");

    assert!(inode.len() >= 64);
    let mut buf = vec![0xFFu8; 64];
    inode.read_at(&cache, &mut buf, 0).expect("read_at must succeed");
    assert!(buf.iter().all(|&b| b == 0), "every byte up to the created length must read back zero");

    registry.close(&inode, &cache, &free_map);
}

pub fn grow_across_indirect_boundary() {
    let cache = BufferCache::new(Disk::new(DISK));
    let free_map = BitmapFreeMap::new(0, 300);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 0).expect("inode_create");
    let inode = registry.open(&cache, sector).expect("inode_open");

    let zeros = vec![0u8; NUM_DIRECT * SECTOR_SIZE];
    let written = inode
        .write_at(&cache, &free_map, &zeros, 0)
        .expect("write_at must succeed");
    assert_eq!(written, zeros.len(), "every direct slot must be reachable before the indirect boundary");

    let written = inode
        .write_at(&cache, &free_map, &[0xAB], zeros.len())
        .expect("write_at across the indirect boundary must succeed");
    assert_eq!(written, 1);
    assert_eq!(inode.len(), zeros.len() + 1);

    let mut buf = [0u8; 1];
    inode
        .read_at(&cache, &mut buf, zeros.len())
        .expect("read_at must succeed");
    assert_eq!(buf[0], 0xAB);

    registry.close(&inode, &cache, &free_map);
}

pub fn write_persists_after_flush() {
    let cache = BufferCache::new(Disk::new(DISK));
    let free_map = BitmapFreeMap::new(1100, 50);
    let registry = InodeRegistry::new();
    let inode_sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, inode_sector, 0).expect("inode_create");
    let inode = registry.open(&cache, inode_sector).expect("inode_open");

    let written = inode
        .write_at(&cache, &free_map, b"TEST", 0)
        .expect("write_at must succeed");
    assert_eq!(written, 4);
    cache.cache_flush();

    // The bump allocator hands out sectors in order, so the inode's first
    // data sector is the one right after its own.
    let data_sector = Sector(inode_sector.0 + 1);
    let raw = Disk::new(DISK);
    let mut buf = [0u8; 512];
    raw.read(data_sector, &mut buf).expect("disk read must succeed");
    assert_eq!(&buf[..4], b"TEST");

    registry.close(&inode, &cache, &free_map);
}

pub fn open_uniqueness() {
    let cache = BufferCache::new(Disk::new(DISK));
    let free_map = BitmapFreeMap::new(2000, 50);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 0).expect("inode_create");

    let a = registry.open(&cache, sector).expect("first inode_open");
    let b = registry.open(&cache, sector).expect("second inode_open");
    assert!(Arc::ptr_eq(&a, &b), "concurrent opens of the same sector must share one object");
    registry.close(&a, &cache, &free_map);

    let c = registry.open(&cache, sector).expect("third inode_open");
    assert!(Arc::ptr_eq(&b, &c), "re-opening before the last close must still return the shared object");

    registry.close(&b, &cache, &free_map);
    registry.close(&c, &cache, &free_map);
}

pub fn deny_write_blocks_writes() {
    let cache = BufferCache::new(Disk::new(DISK));
    let free_map = BitmapFreeMap::new(2100, 50);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 16).expect("inode_create");
    let inode = registry.open(&cache, sector).expect("inode_open");

    inode.deny_write();
    let written = inode
        .write_at(&cache, &free_map, b"hello", 0)
        .expect("write_at must not error, just return 0");
    assert_eq!(written, 0);
    assert_eq!(inode.len(), 16, "a denied write must not extend the file either");

    inode.allow_write();
    let written = inode
        .write_at(&cache, &free_map, b"hello", 0)
        .expect("write_at must succeed once writes are allowed again");
    assert_eq!(written, 5);

    registry.close(&inode, &cache, &free_map);
}

pub fn shrinking_write_does_not_grow() {
    let cache = BufferCache::new(Disk::new(DISK));
    let free_map = BitmapFreeMap::new(2200, 50);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 100).expect("inode_create");
    let inode = registry.open(&cache, sector).expect("inode_open");

    let written = inode
        .write_at(&cache, &free_map, b"hi", 10)
        .expect("write_at must succeed");
    assert_eq!(written, 2);
    assert_eq!(inode.len(), 100, "extend_disk must be a no-op when the target is already covered");

    registry.close(&inode, &cache, &free_map);
}

/// Removal must release every sector the inode ever allocated: its data
/// sectors, every indirect sector it used (regardless of current length),
/// and its own sector.
pub fn remove_releases_indirect_sectors() {
    let cache = BufferCache::new(Disk::new(DISK));
    // Exactly enough sectors for: the inode itself, all 188 direct slots,
    // one indirect sector, and the one data sector it points to.
    let total_sectors = 1 + NUM_DIRECT + 2;
    let free_map = BitmapFreeMap::new(2300, total_sectors);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 0).expect("inode_create");
    let inode = registry.open(&cache, sector).expect("inode_open");

    let len = (NUM_DIRECT + 1) * SECTOR_SIZE;
    let buf = vec![0u8; len];
    let written = inode
        .write_at(&cache, &free_map, &buf, 0)
        .expect("write_at must succeed");
    assert_eq!(written, len);
    assert!(free_map.allocate().is_none(), "the free map must be fully consumed at this point");

    inode.mark_removed();
    registry.close(&inode, &cache, &free_map);

    let mut reclaimed = 0;
    while free_map.allocate().is_some() {
        reclaimed += 1;
    }
    assert_eq!(
        reclaimed, total_sectors,
        "every sector the inode owned (data, indirect, and its own) must return to the free map"
    );
}

/// Growth that would cross `MAX_INODE_LEN` is truncated there: writing at
/// exactly the boundary succeeds, but any byte past it is dropped.
pub fn write_truncates_at_max_inode_len() {
    let cache = BufferCache::new(Disk::new(DISK));
    let needed = 1 + MAX_INODE_LEN / SECTOR_SIZE + NUM_INDIRECT;
    let free_map = BitmapFreeMap::new(5000, needed);
    let registry = InodeRegistry::new();
    let sector = free_map.allocate().expect("allocate inode sector");
    registry.create(&cache, &free_map, sector, 0).expect("inode_create");
    let inode = registry.open(&cache, sector).expect("inode_open");

    let written = inode
        .write_at(&cache, &free_map, &[0xAB], MAX_INODE_LEN - 1)
        .expect("write_at must succeed exactly at the boundary");
    assert_eq!(written, 1);
    assert_eq!(inode.len(), MAX_INODE_LEN);

    let written = inode
        .write_at(&cache, &free_map, &[0xCD, 0xEF], MAX_INODE_LEN - 1)
        .expect("write_at must succeed for the part that still fits");
    assert_eq!(written, 1, "a write crossing MAX_INODE_LEN truncates at the boundary");
    assert_eq!(inode.len(), MAX_INODE_LEN);

    registry.close(&inode, &cache, &free_map);
}
