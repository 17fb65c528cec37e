//! Test doubles for the collaborator traits `keos_project6::external` expects
//! a process/file-system layer to supply: a bitmap free-map and a hardware
//! page directory. Neither exists as a reusable concrete type anywhere in
//! this workspace (the real ones live in a process layer this crate does not
//! depend on), so the grader stands up the smallest thing that satisfies the
//! trait contract.

use alloc::{collections::BTreeMap, sync::Arc};
use keos::{
    addressing::{Pa, Va},
    fs::Sector,
    mm::page_table::Permission,
    sync::SpinLock,
};
use keos_project6::{FreeMap, PageDirectory, SupplementalPageTable};

/// A bump allocator over `[base, base + count)` with a free list for
/// recycling released sectors, the same shape as the real free-map bitmap
/// minus the on-disk persistence.
pub struct BitmapFreeMap {
    inner: SpinLock<BitmapFreeMapInner>,
}

struct BitmapFreeMapInner {
    next: usize,
    limit: usize,
    free: alloc::vec::Vec<Sector>,
}

impl BitmapFreeMap {
    pub fn new(base: usize, count: usize) -> Self {
        Self {
            inner: SpinLock::new(BitmapFreeMapInner {
                next: base,
                limit: base + count,
                free: alloc::vec::Vec::new(),
            }),
        }
    }
}

impl FreeMap for BitmapFreeMap {
    fn allocate(&self) -> Option<Sector> {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.free.pop() {
            inner.unlock();
            return Some(s);
        }
        if inner.next >= inner.limit {
            inner.unlock();
            return None;
        }
        let s = Sector(inner.next);
        inner.next += 1;
        inner.unlock();
        Some(s)
    }

    fn release(&self, sector: Sector) {
        let mut inner = self.inner.lock();
        inner.free.push(sector);
        inner.unlock();
    }
}

struct FakeMapping {
    frame: Pa,
    perm: Permission,
    accessed: bool,
    dirty: bool,
}

/// A software stand-in for a hardware page table: a plain map from user page
/// to (frame, permission, accessed/dirty bits) plus the sup-page table that a
/// real address space would own alongside it.
pub struct FakePageDirectory {
    mappings: SpinLock<BTreeMap<Va, FakeMapping>>,
    sup: SupplementalPageTable,
}

impl Default for FakePageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePageDirectory {
    pub fn new() -> Self {
        Self {
            mappings: SpinLock::new(BTreeMap::new()),
            sup: SupplementalPageTable::new(),
        }
    }

    /// Wraps `self` in the `Arc` the frame table and `page_fetch` require
    /// (they hold a `Weak` back-reference to the owning address space).
    pub fn shared() -> Arc<dyn PageDirectory> {
        Arc::new(Self::new())
    }
}

impl PageDirectory for FakePageDirectory {
    fn get_page(&self, uaddr: Va) -> Option<Pa> {
        let mappings = self.mappings.lock();
        let pa = mappings.get(&uaddr).map(|m| m.frame);
        mappings.unlock();
        pa
    }

    fn set_page(&self, uaddr: Va, frame: Pa, perm: Permission) -> bool {
        let mut mappings = self.mappings.lock();
        mappings.insert(
            uaddr,
            FakeMapping {
                frame,
                perm,
                accessed: false,
                dirty: false,
            },
        );
        mappings.unlock();
        true
    }

    fn clear_page(&self, uaddr: Va) {
        let mut mappings = self.mappings.lock();
        mappings.remove(&uaddr);
        mappings.unlock();
    }

    fn is_accessed(&self, uaddr: Va) -> bool {
        let mappings = self.mappings.lock();
        let v = mappings.get(&uaddr).is_some_and(|m| m.accessed);
        mappings.unlock();
        v
    }

    fn set_accessed(&self, uaddr: Va, value: bool) {
        let mut mappings = self.mappings.lock();
        if let Some(m) = mappings.get_mut(&uaddr) {
            m.accessed = value;
        }
        mappings.unlock();
    }

    fn is_dirty(&self, uaddr: Va) -> bool {
        let mappings = self.mappings.lock();
        let v = mappings.get(&uaddr).is_some_and(|m| m.dirty);
        mappings.unlock();
        v
    }

    fn set_dirty(&self, uaddr: Va, value: bool) {
        let mut mappings = self.mappings.lock();
        if let Some(m) = mappings.get_mut(&uaddr) {
            m.dirty = value;
        }
        mappings.unlock();
    }

    fn sup_page_table(&self) -> &SupplementalPageTable {
        &self.sup
    }
}

impl FakePageDirectory {
    /// Test-only escape hatch: marks `uaddr` dirty the way a real page fault
    /// on a write would, without going through `set_page`'s bookkeeping.
    pub fn mark_dirty(&self, uaddr: Va, value: bool) {
        self.set_dirty(uaddr, value);
    }

    /// Reads back the permission a write-test installed, confirming
    /// `page_fetch` picked the writable/read-only split it was supposed to.
    pub fn permission_of(&self, uaddr: Va) -> Option<Permission> {
        let mappings = self.mappings.lock();
        let v = mappings.get(&uaddr).map(|m| m.perm);
        mappings.unlock();
        v
    }
}

/// An in-memory file backing mmap-style sup-pages, sized once at creation.
/// Reads past the live length are defined to fail rather than zero-fill —
/// matching `traits::RegularFile::read`'s `Ok(false)` contract for a hole —
/// so `SupplementalPageTable::page_write_data`'s own zero-fill-on-short-read
/// logic is exercised instead of this stub's.
pub struct TestFile {
    data: SpinLock<alloc::vec::Vec<u8>>,
}

impl TestFile {
    pub fn new(len: usize) -> keos::fs::RegularFile {
        keos::fs::RegularFile::new(Self {
            data: SpinLock::new(alloc::vec![0u8; len]),
        })
    }
}

impl keos::fs::traits::RegularFile for TestFile {
    fn ino(&self) -> keos::fs::InodeNumber {
        keos::fs::InodeNumber::new(1).expect("1 is non-zero")
    }

    fn size(&self) -> usize {
        let data = self.data.lock();
        let n = data.len();
        data.unlock();
        n
    }

    fn read(&self, fba: keos::fs::FileBlockNumber, buf: &mut [u8; 4096]) -> Result<bool, keos::KernelError> {
        let data = self.data.lock();
        let offset = fba.0 * 4096;
        if offset >= data.len() {
            data.unlock();
            buf.fill(0);
            return Ok(false);
        }
        let n = (data.len() - offset).min(4096);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        buf[n..].fill(0);
        data.unlock();
        Ok(true)
    }

    fn write(
        &self,
        fba: keos::fs::FileBlockNumber,
        buf: &[u8; 4096],
        min_size: usize,
    ) -> Result<(), keos::KernelError> {
        let mut data = self.data.lock();
        let offset = fba.0 * 4096;
        if min_size > data.len() {
            data.resize(min_size, 0);
        }
        let n = data.len().saturating_sub(offset).min(4096);
        data[offset..offset + n].copy_from_slice(&buf[..n]);
        data.unlock();
        Ok(())
    }

    fn writeback(&self) -> Result<(), keos::KernelError> {
        Ok(())
    }
}
