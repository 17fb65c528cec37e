//! Swap area: a dedicated block device divided into fixed-size slots.

use crate::config::{PAGE_SIZE, SWAP_SLOT_SECTORS};
use alloc::vec::Vec;
use keos::{
    KernelError,
    fs::{Disk, Sector},
    sync::SpinLock,
};

/// A contiguous run of `SWAP_SLOT_SECTORS` sectors on the swap device.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct SwapSlot {
    first_sector: Sector,
}

struct SwapTableInner {
    occupied: Vec<SwapSlot>,
    free: Vec<SwapSlot>,
    /// First sector never yet carved into a slot.
    next_sector: usize,
}

/// The swap pool.
pub struct SwapTable {
    disk: Disk,
    inner: SpinLock<SwapTableInner>,
}

impl SwapTable {
    pub fn new(disk: Disk) -> Self {
        Self {
            disk,
            inner: SpinLock::new(SwapTableInner {
                occupied: Vec::new(),
                free: Vec::new(),
                next_sector: 0,
            }),
        }
    }

    /// Writes `PAGE_SIZE` bytes from `kpage` to a fresh slot, preferring a
    /// slot recycled from `free` over carving a new one at the high-water
    /// mark. Fails if the device has no room for a new slot.
    pub fn swap_out(&self, kpage: &[u8; PAGE_SIZE]) -> Result<SwapSlot, KernelError> {
        let mut inner = self.inner.lock();
        let slot = match inner.free.pop() {
            Some(slot) => slot,
            None => {
                let first_sector = inner.next_sector;
                if first_sector + SWAP_SLOT_SECTORS > self.disk.sector_count() {
                    inner.unlock();
                    return Err(KernelError::NoSpace);
                }
                inner.next_sector += SWAP_SLOT_SECTORS;
                SwapSlot {
                    first_sector: Sector(first_sector),
                }
            }
        };
        inner.unlock();

        for i in 0..SWAP_SLOT_SECTORS {
            let chunk: &[u8; 512] = kpage[i * 512..(i + 1) * 512].try_into().unwrap();
            self.disk.write(slot.first_sector + i, chunk)?;
        }

        let mut inner = self.inner.lock();
        inner.occupied.push(slot);
        inner.unlock();
        Ok(slot)
    }

    /// Reads `slot`'s sectors into `kpage` and moves the slot to `free`.
    pub fn swap_in(&self, slot: SwapSlot, kpage: &mut [u8; PAGE_SIZE]) -> Result<(), KernelError> {
        for i in 0..SWAP_SLOT_SECTORS {
            let chunk: &mut [u8; 512] = (&mut kpage[i * 512..(i + 1) * 512]).try_into().unwrap();
            self.disk.read(slot.first_sector + i, chunk)?;
        }

        let mut inner = self.inner.lock();
        inner.occupied.retain(|&s| s != slot);
        inner.free.push(slot);
        inner.unlock();
        Ok(())
    }
}
