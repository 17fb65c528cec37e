//! Write-back buffer cache fronting a sector-addressable block device.
//!
//! A fixed pool of `CACHE_SIZE` entries. A single table lock `G` (the
//! clock hand) protects slot indexing and victim selection; each entry
//! additionally has its own lock `E_i` guarding its buffer and dirty bit.
//! `G` is never held across disk I/O, and at most one `E_i` is held at a
//! time.

use crate::config::{CACHE_SIZE, SECTOR_SIZE, WRITE_BEHIND_PERIOD_TICKS};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use keos::{
    KernelError,
    fs::{Disk, Sector},
    sync::{SpinLock, SpinLockGuard},
    thread::ThreadBuilder,
};

/// Sentinel stored in `CacheEntry::sector` for an entry that has never held
/// data (the on-disk encoding's `NONE` has no meaning here; this is purely
/// an in-memory marker).
const NONE: usize = usize::MAX;

struct CacheData {
    dirty: bool,
    buf: [u8; SECTOR_SIZE],
}

/// One pool slot.
///
/// `sector` and `accessed` are read during the table-lock-held scan without
/// blocking on a busy `E_i`; they are only ever written while `E_i` (the
/// `data` lock) is held.
struct CacheEntry {
    sector: AtomicUsize,
    accessed: AtomicBool,
    data: SpinLock<CacheData>,
}

impl CacheEntry {
    const fn new() -> Self {
        Self {
            sector: AtomicUsize::new(NONE),
            accessed: AtomicBool::new(false),
            data: SpinLock::new(CacheData {
                dirty: false,
                buf: [0; SECTOR_SIZE],
            }),
        }
    }
}

/// The buffer cache itself, plus the background write-behind thread.
pub struct BufferCache {
    disk: Disk,
    entries: [CacheEntry; CACHE_SIZE],
    /// The clock hand; holding this lock is what the design calls `G`.
    hand: SpinLock<usize>,
}

impl BufferCache {
    pub fn new(disk: Disk) -> Arc<Self> {
        let cache = Arc::new(Self {
            disk,
            entries: core::array::from_fn(|_| CacheEntry::new()),
            hand: SpinLock::new(0),
        });
        let background = cache.clone();
        ThreadBuilder::new("write-behind").spawn(move || {
            loop {
                for _ in 0..WRITE_BEHIND_PERIOD_TICKS {
                    keos::thread::scheduler::scheduler().reschedule();
                }
                debug!("write-behind: flushing dirty cache entries.");
                background.cache_flush();
            }
        });
        cache
    }

    /// Second-chance clock victim selection. Bounded by `2 * CACHE_SIZE`
    /// inspections: every entry skipped has its `accessed` bit cleared, so
    /// it can be skipped at most once more before it is chosen.
    fn select_victim(&self, hand: &mut usize) -> usize {
        let mut inspected = 0;
        loop {
            let i = *hand;
            *hand = (*hand + 1) % CACHE_SIZE;
            inspected += 1;
            debug_assert!(inspected <= 2 * CACHE_SIZE, "clock scan failed to terminate");
            if self.entries[i].accessed.swap(false, Ordering::SeqCst) {
                continue;
            }
            return i;
        }
    }

    /// Locates `sector`'s entry, returning it locked under `E_i`. On a
    /// miss, a victim is evicted (flushed if dirty) and reassigned to
    /// `sector`; its buffer is read from the device unless `read_through`
    /// is false (the `cache_zero` path, which never needs the old content).
    fn locate(
        &self,
        sector: Sector,
        read_through: bool,
    ) -> Result<(usize, SpinLockGuard<'_, CacheData>), KernelError> {
        loop {
            let mut hand = self.hand.lock();
            let hit = (0..CACHE_SIZE)
                .find(|&i| self.entries[i].sector.load(Ordering::SeqCst) == sector.0);
            if let Some(idx) = hit {
                hand.unlock();
                let guard = self.entries[idx].data.lock();
                if self.entries[idx].sector.load(Ordering::SeqCst) != sector.0 {
                    // Evicted while we were waiting for E_i; restart.
                    guard.unlock();
                    continue;
                }
                self.entries[idx].accessed.store(true, Ordering::SeqCst);
                return Ok((idx, guard));
            }

            let victim = self.select_victim(&mut hand);
            hand.unlock();

            let mut guard = self.entries[victim].data.lock();
            if self.entries[victim].accessed.load(Ordering::SeqCst) {
                // Touched again (or reclaimed by someone else) since we
                // released G; it is no longer a valid victim.
                guard.unlock();
                continue;
            }
            if guard.dirty {
                let old = self.entries[victim].sector.load(Ordering::SeqCst);
                debug_assert_ne!(old, NONE, "dirty entry must have a valid sector");
                if let Err(e) = self.disk.write(Sector(old), &guard.buf) {
                    guard.unlock();
                    return Err(e);
                }
                guard.dirty = false;
            }
            if read_through {
                if let Err(e) = self.disk.read(sector, &mut guard.buf) {
                    guard.unlock();
                    return Err(e);
                }
            } else {
                guard.buf = [0; SECTOR_SIZE];
            }
            self.entries[victim].sector.store(sector.0, Ordering::SeqCst);
            self.entries[victim].accessed.store(true, Ordering::SeqCst);
            return Ok((victim, guard));
        }
    }

    /// Copies `size` bytes starting at `offset` within `sector` into `dst`.
    pub fn cache_read(
        &self,
        sector: Sector,
        dst: &mut [u8],
        offset: usize,
        size: usize,
    ) -> Result<(), KernelError> {
        assert!(offset + size <= SECTOR_SIZE);
        let (_, guard) = self.locate(sector, true)?;
        dst[..size].copy_from_slice(&guard.buf[offset..offset + size]);
        guard.unlock();
        Ok(())
    }

    /// Copies `src` into `sector`'s buffer at `offset`, marking it dirty.
    pub fn cache_write(
        &self,
        sector: Sector,
        src: &[u8],
        offset: usize,
        size: usize,
    ) -> Result<(), KernelError> {
        assert!(offset + size <= SECTOR_SIZE);
        let (_, mut guard) = self.locate(sector, true)?;
        guard.buf[offset..offset + size].copy_from_slice(&src[..size]);
        guard.dirty = true;
        guard.unlock();
        Ok(())
    }

    /// Fills `sector`'s buffer with zeros without reading the device first.
    pub fn cache_zero(&self, sector: Sector) -> Result<(), KernelError> {
        let (_, mut guard) = self.locate(sector, false)?;
        guard.buf = [0; SECTOR_SIZE];
        guard.dirty = true;
        guard.unlock();
        Ok(())
    }

    /// Writes every dirty entry back to the device.
    pub fn cache_flush(&self) {
        for entry in &self.entries {
            let mut guard = entry.data.lock();
            if guard.dirty {
                let s = entry.sector.load(Ordering::SeqCst);
                if s != NONE {
                    let _ = self.disk.write(Sector(s), &guard.buf);
                }
                guard.dirty = false;
            }
            guard.unlock();
        }
    }
}
