//! Exercises the write-back buffer cache against the literal scenarios in
//! the storage core's boundary-behavior and dirty-writeback invariants.

use keos::fs::{Disk, Sector};
use keos_project6::{BufferCache, config::CACHE_SIZE};

/// A disk index dedicated to these tests so they never collide with the
/// inode or swap tests' sector ranges.
const DISK: usize = 4;

pub fn dirty_write_back() {
    let cache = BufferCache::new(Disk::new(DISK));
    let sector = Sector(0);
    cache
        .cache_write(sector, b"TEST", 0, 4)
        .expect("cache_write must succeed");
    cache.cache_flush();

    let raw = Disk::new(DISK);
    let mut buf = [0u8; 512];
    raw.read(sector, &mut buf).expect("disk read must succeed");
    assert_eq!(&buf[..4], b"TEST", "flush must write the dirty entry back to the device");
}

pub fn write_exactly_one_byte_at_last_offset() {
    let cache = BufferCache::new(Disk::new(DISK));
    let sector = Sector(1);
    cache.cache_zero(sector).expect("cache_zero must succeed");
    cache
        .cache_write(sector, &[0xAB], 511, 1)
        .expect("cache_write at offset 511 must succeed");

    let mut buf = [0u8; 512];
    cache
        .cache_read(sector, &mut buf, 0, 512)
        .expect("cache_read must succeed");
    assert_eq!(buf[511], 0xAB);
    assert!(buf[..511].iter().all(|&b| b == 0), "only the last byte should have changed");
}

pub fn zero_ignores_device_content() {
    let seed = Disk::new(DISK);
    seed.write(Sector(2), &[0x77; 512]).expect("seeding the device must succeed");

    let cache = BufferCache::new(Disk::new(DISK));
    cache
        .cache_zero(Sector(2))
        .expect("cache_zero must succeed without reading the device first");

    let mut buf = [0xFFu8; 512];
    cache
        .cache_read(Sector(2), &mut buf, 0, 512)
        .expect("cache_read must succeed");
    assert!(buf.iter().all(|&b| b == 0));
}

/// Writes to `2 * CACHE_SIZE` distinct sectors, far more than the pool can
/// hold resident at once, then re-reads the earliest ones through a fresh
/// cache instance. Those entries must have been evicted and written back
/// (not silently dropped) long before this function returns.
pub fn eviction_writes_back_dirty_entries() {
    let base = 100;
    {
        let cache = BufferCache::new(Disk::new(DISK));
        for i in 0..(CACHE_SIZE * 2) {
            let sector = Sector(base + i);
            cache
                .cache_write(sector, &[(i % 256) as u8], 0, 1)
                .expect("cache_write must succeed");
        }
    }

    let verify = BufferCache::new(Disk::new(DISK));
    let mut buf = [0u8; 1];
    for i in 0..4 {
        verify
            .cache_read(Sector(base + i), &mut buf, 0, 1)
            .expect("cache_read must succeed");
        assert_eq!(buf[0], (i % 256) as u8, "evicted dirty entry {i} must have reached the device");
    }
}
