//! The frame table: a fixed set of physical frames shared by every process,
//! handed out by a second-chance clock algorithm.

use crate::{config::PAGE_SIZE, external::PageDirectory, swap::SwapTable};
use alloc::{sync::Arc, sync::Weak, vec::Vec};
use keos::{
    KernelError,
    addressing::{Pa, Va},
    mm::{ContigPages, Page, PageRef, page_table::Permission},
    sync::{SpinLock, SpinLockGuard},
};

struct FrameState {
    /// Parallel to `FrameTable::frames`: the pagedir (if any) that currently
    /// owns each frame, and the user page it is mapped at.
    owners: Vec<Option<(Weak<dyn PageDirectory>, Va)>>,
    hand: usize,
    /// Set once a full pass finds no never-allocated frame left. Mirrors
    /// the original `get_next_frame`'s function-local static: once set, it
    /// is never cleared, even if frames are later freed by `frame_free`.
    fail_on_next: bool,
}

/// The frame table.
pub struct FrameTable {
    frames: Vec<Page>,
    state: SpinLock<FrameState>,
}

impl FrameTable {
    /// Drains `num_frames` pages out of the physical-page allocator to
    /// build the fixed frame list.
    pub fn new(num_frames: usize) -> Self {
        let frames = ContigPages::new(num_frames * PAGE_SIZE)
            .expect("Failed to allocate frame table")
            .split();
        let owners = (0..frames.len()).map(|_| None).collect();
        Self {
            frames,
            state: SpinLock::new(FrameState {
                owners,
                hand: 0,
                fail_on_next: false,
            }),
        }
    }

    /// Scans forward from the hand for a never-allocated frame. Consumes
    /// the hand position even when it fails, so a subsequent call resumes
    /// where this one left off.
    fn scan_for_free(&self, state: &mut FrameState) -> Option<usize> {
        let n = self.frames.len();
        for _ in 0..n {
            let i = state.hand;
            state.hand = (i + 1) % n;
            if state.owners[i].is_none() {
                return Some(i);
            }
        }
        None
    }

    /// Second-chance clock: skip frames whose owner's accessed bit is set
    /// (clearing it), pick the first one that is not (or has no owner at
    /// all). Bounded by `2 * len` inspections.
    fn select_victim(&self, state: &mut FrameState) -> usize {
        let n = self.frames.len();
        let mut inspected = 0;
        loop {
            let i = state.hand;
            state.hand = (i + 1) % n;
            inspected += 1;
            debug_assert!(inspected <= 2 * n, "frame clock scan failed to terminate");
            match &state.owners[i] {
                None => return i,
                Some((weak_pd, up)) => match weak_pd.upgrade() {
                    Some(pd) => {
                        if pd.is_accessed(*up) {
                            pd.set_accessed(*up, false);
                            continue;
                        }
                        return i;
                    }
                    // Owning pagedir was dropped without calling frame_free.
                    None => return i,
                },
            }
        }
    }

    /// Evicts the clock-selected victim and reserves its frame for
    /// `(pagedir, up)`. On a swap failure, the reservation is rolled back
    /// and the victim is left exactly as it was.
    fn evict(
        &self,
        mut state: SpinLockGuard<'_, FrameState>,
        swap: &SwapTable,
        pagedir: &Arc<dyn PageDirectory>,
        up: Va,
    ) -> Result<usize, KernelError> {
        let victim = self.select_victim(&mut state);
        let evicted = state.owners[victim].take();
        state.owners[victim] = Some((Arc::downgrade(pagedir), up));
        state.unlock();

        if let Some((weak_pd, old_up)) = evicted {
            if let Some(old_pd) = weak_pd.upgrade() {
                debug!("frame {victim}: evicting user page {:#x} to swap.", old_up.into_usize());
                let page_ref = unsafe { PageRef::from_pa(self.frames[victim].pa()) };
                let arr: &[u8; PAGE_SIZE] = page_ref
                    .inner()
                    .try_into()
                    .expect("frame backing store is exactly PAGE_SIZE bytes");
                match swap.swap_out(arr) {
                    Ok(slot) => {
                        old_pd.sup_page_table().page_set_swap(old_up, slot);
                        old_pd.clear_page(old_up);
                    }
                    Err(e) => {
                        let mut state = self.state.lock();
                        state.owners[victim] = Some((weak_pd, old_up));
                        state.unlock();
                        return Err(e);
                    }
                }
            }
        }
        Ok(victim)
    }

    /// Obtains a frame for `up` in `pagedir`, installing it with `writable`.
    pub fn frame_alloc(
        &self,
        pagedir: &Arc<dyn PageDirectory>,
        swap: &SwapTable,
        up: Va,
        writable: bool,
    ) -> Result<Pa, KernelError> {
        let mut state = self.state.lock();
        let idx = if !state.fail_on_next {
            match self.scan_for_free(&mut state) {
                Some(i) => {
                    state.owners[i] = Some((Arc::downgrade(pagedir), up));
                    state.unlock();
                    i
                }
                None => {
                    state.fail_on_next = true;
                    self.evict(state, swap, pagedir, up)?
                }
            }
        } else {
            self.evict(state, swap, pagedir, up)?
        };

        let pa = self.frames[idx].pa();
        let perm = if writable {
            Permission::READ | Permission::WRITE
        } else {
            Permission::READ
        };
        assert!(
            pagedir.set_page(up, pa, perm),
            "set_page failed for a freshly obtained frame"
        );
        Ok(pa)
    }

    /// Marks every frame owned by `pagedir` as unowned. Does not touch the
    /// pagedir's sup-pages; the caller tears those down separately.
    pub fn frame_free(&self, pagedir: &Arc<dyn PageDirectory>) {
        let mut state = self.state.lock();
        for owner in state.owners.iter_mut() {
            let owned_by_pagedir = match owner {
                Some((weak_pd, _)) => weak_pd
                    .upgrade()
                    .is_some_and(|pd| Arc::ptr_eq(&pd, pagedir)),
                None => false,
            };
            if owned_by_pagedir {
                *owner = None;
            }
        }
        state.unlock();
    }
}
