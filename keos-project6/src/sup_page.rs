//! Per-process supplemental page table.
//!
//! Maps a user virtual page to the one backing source that currently
//! describes its contents: a resident frame, a file region to demand-load,
//! or a swap slot holding its evicted image. Exactly one of those is
//! meaningful at a time; a freshly stack-grown page has none (zero-fill).

use crate::{
    config::{PAGE_SIZE, STACK_GROWTH_LIMIT, USER_TOP},
    external::PageDirectory,
    frame::FrameTable,
    swap::{SwapSlot, SwapTable},
};
use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use keos::{
    KernelError,
    addressing::{Pa, Va},
    fs::RegularFile,
    mm::PageRef,
    sync::SpinLock,
};

struct SupPage {
    writable: bool,
    active: bool,
    frame: Option<Pa>,
    file: Option<(RegularFile, usize)>,
    swap_slot: Option<SwapSlot>,
}

/// Per-process ordered set of sup-pages, keyed by user page.
pub struct SupplementalPageTable {
    pages: SpinLock<BTreeMap<Va, SupPage>>,
}

impl Default for SupplementalPageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        Self {
            pages: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Whether `up` currently has a sup-page entry.
    pub fn contains(&self, up: Va) -> bool {
        let pages = self.pages.lock();
        let has = pages.contains_key(&up);
        pages.unlock();
        has
    }

    /// Registers `up` as demand-loaded from `file[offset .. offset+PAGE_SIZE)`.
    pub fn page_set_file(&self, up: Va, file: RegularFile, offset: usize) {
        let mut pages = self.pages.lock();
        pages.insert(
            up,
            SupPage {
                writable: true,
                active: false,
                frame: None,
                file: Some((file, offset)),
                swap_slot: None,
            },
        );
        pages.unlock();
    }

    /// Installs a resident frame, creating the sup-page lazily if absent
    /// (the stack-growth path).
    pub fn page_set_frame(&self, up: Va, frame: Pa, writable: bool) {
        let mut pages = self.pages.lock();
        match pages.get_mut(&up) {
            Some(page) => {
                assert_eq!(
                    page.writable, writable,
                    "page_set_frame: writable flag changed across re-fault"
                );
                page.active = true;
                page.frame = Some(frame);
            }
            None => {
                pages.insert(
                    up,
                    SupPage {
                        writable,
                        active: true,
                        frame: Some(frame),
                        file: None,
                        swap_slot: None,
                    },
                );
            }
        }
        pages.unlock();
    }

    /// Transitions a resident page to swapped-out, clearing `active`.
    pub fn page_set_swap(&self, up: Va, slot: SwapSlot) {
        let mut pages = self.pages.lock();
        if let Some(page) = pages.get_mut(&up) {
            page.active = false;
            page.frame = None;
            page.swap_slot = Some(slot);
        }
        pages.unlock();
    }

    /// Reports the sup-page's writable flag.
    pub fn page_is_writable(&self, up: Va) -> bool {
        let pages = self.pages.lock();
        let w = pages
            .get(&up)
            .expect("page_is_writable: no sup-page for address")
            .writable;
        pages.unlock();
        w
    }

    /// Unregisters `up`'s sup-page. Does not touch the hardware mapping;
    /// callers that also need `clear_page` call it themselves.
    pub fn page_remove(&self, up: Va) {
        let mut pages = self.pages.lock();
        pages.remove(&up);
        pages.unlock();
    }

    /// Materializes `up`'s contents into its currently-assigned frame: reads
    /// from the backing file (zero-filling past EOF) or from its swap slot,
    /// or zero-fills outright for a page with neither (stack growth). Clears
    /// the hardware dirty bit on success.
    pub fn page_write_data(
        &self,
        up: Va,
        pagedir: &dyn PageDirectory,
        swap: &SwapTable,
    ) -> Result<(), KernelError> {
        let (frame, file, slot) = {
            let pages = self.pages.lock();
            let page = pages
                .get(&up)
                .expect("page_write_data: no sup-page for address");
            let r = (
                page.frame.expect("page_write_data: sup-page has no resident frame"),
                page.file.clone(),
                page.swap_slot,
            );
            pages.unlock();
            r
        };
        let mut page_ref = unsafe { PageRef::from_pa(frame) };
        let buf = page_ref.inner_mut();
        let arr: &mut [u8; PAGE_SIZE] = buf
            .try_into()
            .expect("frame backing store is exactly PAGE_SIZE bytes");
        if let Some((file, offset)) = file {
            let size = file.size().saturating_sub(offset).min(PAGE_SIZE);
            arr[size..].fill(0);
            if size > 0 {
                file.read(offset, &mut arr[..size])?;
            }
        } else if let Some(slot) = slot {
            swap.swap_in(slot, arr)?;
        } else {
            arr.fill(0);
        }
        pagedir.set_dirty(up, false);
        Ok(())
    }

    /// For every sup-page backed by `file`: writes back its current contents
    /// if the hardware dirty bit is set, then removes it.
    pub fn page_unmap(&self, file: &RegularFile, pagedir: &dyn PageDirectory) {
        let victims: Vec<Va> = {
            let pages = self.pages.lock();
            let v = pages
                .iter()
                .filter(|(_, p)| {
                    p.file
                        .as_ref()
                        .is_some_and(|(f, _)| Arc::ptr_eq(&f.0, &file.0))
                })
                .map(|(up, _)| *up)
                .collect();
            pages.unlock();
            v
        };
        for up in victims {
            if pagedir.is_dirty(up) {
                let (frame, offset) = {
                    let pages = self.pages.lock();
                    let page = pages.get(&up).expect("page_unmap: sup-page vanished");
                    let r = (page.frame, page.file.as_ref().expect("page_unmap: not file-backed").1);
                    pages.unlock();
                    r
                };
                if let Some(frame) = frame {
                    let page_ref = unsafe { PageRef::from_pa(frame) };
                    let size = file.size().saturating_sub(offset).min(PAGE_SIZE);
                    let _ = file.write(offset, &page_ref.inner()[..size]);
                }
            }
            self.page_remove(up);
            pagedir.clear_page(up);
        }
    }
}

/// Whether `va` falls in the user half of the address space.
fn is_user_address(va: Va) -> bool {
    let a = va.into_usize();
    a != 0 && a < USER_TOP
}

/// Stack growth is triggered by a push (`esp-4`), a `pusha` (`esp-32`), or
/// any access at or above the current stack pointer.
fn is_stack_growth(uaddr: Va, esp: Va) -> bool {
    let (u, e) = (uaddr.into_usize(), esp.into_usize());
    u == e.wrapping_sub(4) || u == e.wrapping_sub(32) || (u >= e && u < USER_TOP)
}

/// The unified fault/validation entry point.
///
/// `esp` is `None` for a pre-syscall argument check (stack growth never
/// applies there) and `Some(stack pointer)` for an in-fault check.
pub fn page_fetch(
    sup: &SupplementalPageTable,
    frames: &FrameTable,
    swap: &SwapTable,
    pagedir: &Arc<dyn PageDirectory>,
    uaddr: Va,
    esp: Option<Va>,
    write: bool,
) -> Result<(), KernelError> {
    if !is_user_address(uaddr) {
        return Err(KernelError::BadAddress);
    }
    let page = uaddr.page_down();
    if !sup.contains(page) {
        let esp = esp.ok_or(KernelError::BadAddress)?;
        if !is_stack_growth(uaddr, esp) {
            return Err(KernelError::BadAddress);
        }
        if esp.into_usize().saturating_sub(page.into_usize()) > STACK_GROWTH_LIMIT {
            return Err(KernelError::NoSpace);
        }
        let frame = frames.frame_alloc(pagedir, swap, page, true)?;
        sup.page_set_frame(page, frame, true);
        sup.page_write_data(page, pagedir.as_ref(), swap)?;
        return Ok(());
    }
    if write && !sup.page_is_writable(page) {
        return Err(KernelError::InvalidAccess);
    }
    let writable = sup.page_is_writable(page);
    let frame = frames.frame_alloc(pagedir, swap, page, writable)?;
    sup.page_set_frame(page, frame, writable);
    sup.page_write_data(page, pagedir.as_ref(), swap)?;
    Ok(())
}
