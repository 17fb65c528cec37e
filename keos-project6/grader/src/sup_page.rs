//! Exercises the supplemental page table's unified fault/validation entry
//! point: stack growth, its hard cap, and file-backed demand paging
//! including the `mmap`/`munmap` writeback round trip.

use crate::support::{FakePageDirectory, TestFile};
use alloc::sync::Arc;
use keos::{KernelError, addressing::Va, fs::Disk};
use keos_project6::{FrameTable, PageDirectory, SwapTable, page_fetch};

const SWAP_DISK: usize = 3;

fn fresh_frames_and_swap() -> (FrameTable, SwapTable) {
    (FrameTable::new(8), SwapTable::new(Disk::new(SWAP_DISK)))
}

/// A fault exactly at `esp - 4` (the result of a `push`) triggers stack
/// growth on an address with no prior sup-page entry.
pub fn stack_growth_esp_minus_4_succeeds() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let esp = Va::new(0xbffff000).unwrap();
    let uaddr = Va::new(0xbfffeffc).unwrap();

    page_fetch(pd.sup_page_table(), &frames, &swap, &pd, uaddr, Some(esp), true)
        .expect("fault at esp-4 must grow the stack");
    assert!(pd.get_page(Va::new(0xbfffe000).unwrap()).is_some());
}

/// A fault at `esp - 32` (the result of a `pusha`) also triggers growth.
pub fn stack_growth_esp_minus_32_succeeds() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let esp = Va::new(0xbffff000).unwrap();
    let uaddr = Va::new(0xbfffefe0).unwrap();

    page_fetch(pd.sup_page_table(), &frames, &swap, &pd, uaddr, Some(esp), true)
        .expect("fault at esp-32 must grow the stack");
}

/// Any access at or above the current stack pointer is stack growth too,
/// not just the two push-shaped offsets below it.
pub fn stack_growth_at_or_above_esp_succeeds() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let esp = Va::new(0xbffff000).unwrap();

    page_fetch(pd.sup_page_table(), &frames, &swap, &pd, esp, Some(esp), true)
        .expect("a fault exactly at esp must grow the stack");
}

/// A fault further below the stack pointer than either recognized pattern
/// is not stack growth and must fail.
pub fn stack_growth_esp_minus_36_fails() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let esp = Va::new(0xbffff000).unwrap();
    let uaddr = Va::new(0xbfffefdc).unwrap();

    let result = page_fetch(pd.sup_page_table(), &frames, &swap, &pd, uaddr, Some(esp), true);
    assert!(result.is_err(), "esp-36 does not match any recognized stack-growth pattern");
}

/// The hard cap bounds how far a fault's page sits below `esp`, not how far
/// `esp` itself sits from `USER_TOP`: a stack pointer nowhere near the top
/// of the address space must still be able to grow by a `push`.
pub fn stack_growth_far_from_user_top_still_succeeds() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let esp = Va::new(0x1000).unwrap();
    let uaddr = Va::new(0x1000 - 4).unwrap();

    page_fetch(pd.sup_page_table(), &frames, &swap, &pd, uaddr, Some(esp), true)
        .expect("growth just below esp must succeed however far esp sits from USER_TOP");
}

/// A pre-syscall validation check (`esp = None`) never treats an unmapped
/// address as stack growth, even one that would otherwise qualify.
pub fn validation_mode_never_grows_the_stack() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let uaddr = Va::new(0xbfffeffc).unwrap();

    let result = page_fetch(pd.sup_page_table(), &frames, &swap, &pd, uaddr, None, true);
    assert_eq!(result, Err(KernelError::BadAddress));
}

/// `mmap` followed by `munmap`: a dirtied page is written back to the file
/// at exactly its recorded offset, and the mapping is torn down.
pub fn mmap_round_trip() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd = Arc::new(FakePageDirectory::new());
    let trait_pd: Arc<dyn PageDirectory> = pd.clone();
    let file = TestFile::new(1025);
    let addr = Va::new(0x5000_0000).unwrap();

    pd.sup_page_table().page_set_file(addr, file.clone(), 0);
    page_fetch(pd.sup_page_table(), &frames, &swap, &trait_pd, addr, None, true)
        .expect("demand-loading a freshly mapped page must succeed");

    let frame = pd.get_page(addr).expect("page_fetch must have installed a frame");
    let mut page_ref = unsafe { keos::mm::PageRef::from_pa(frame) };
    page_ref.inner_mut()[1024] = 0xFF;
    pd.mark_dirty(addr, true);

    pd.sup_page_table().page_unmap(&file, pd.as_ref());

    assert_eq!(file.size(), 1025, "munmap must not change the file's length");
    let mut byte = [0u8; 1];
    file.read(1024, &mut byte).expect("file read must succeed");
    assert_eq!(byte[0], 0xFF, "the dirtied byte must have been written back");
    assert!(pd.get_page(addr).is_none(), "munmap must clear the hardware mapping");
}

/// A file-backed page that was never dirtied is not written back on
/// `munmap` — only the hardware dirty bit gates the writeback.
pub fn munmap_skips_clean_pages() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd = Arc::new(FakePageDirectory::new());
    let trait_pd: Arc<dyn PageDirectory> = pd.clone();
    let file = TestFile::new(4096);
    let addr = Va::new(0x5000_1000).unwrap();

    pd.sup_page_table().page_set_file(addr, file.clone(), 0);
    page_fetch(pd.sup_page_table(), &frames, &swap, &trait_pd, addr, None, false)
        .expect("demand-loading a freshly mapped page must succeed");

    pd.sup_page_table().page_unmap(&file, pd.as_ref());
    assert!(pd.get_page(addr).is_none());
}

/// A page backed by `page_set_file` is writable by construction (this
/// model has no read-only mmap variant): a write fault on a freshly
/// mapped page must succeed and install a writable mapping.
pub fn file_backed_pages_are_writable() {
    let (frames, swap) = fresh_frames_and_swap();
    let pd = Arc::new(FakePageDirectory::new());
    let trait_pd: Arc<dyn PageDirectory> = pd.clone();
    let file = TestFile::new(4096);
    let addr = Va::new(0x5000_2000).unwrap();

    pd.sup_page_table().page_set_file(addr, file.clone(), 0);
    page_fetch(pd.sup_page_table(), &frames, &swap, &trait_pd, addr, None, true)
        .expect("a write fault on a file-backed page must succeed");
    assert_eq!(
        pd.permission_of(addr),
        Some(keos::mm::page_table::Permission::READ | keos::mm::page_table::Permission::WRITE)
    );
    assert!(pd.sup_page_table().page_is_writable(addr));
}
