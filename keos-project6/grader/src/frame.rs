//! Exercises the frame table: allocation, `frame_free`, and second-chance
//! clock eviction under pressure.

use crate::support::FakePageDirectory;
use alloc::sync::Arc;
use keos::{addressing::Va, fs::Disk};
use keos_project6::{FrameTable, PageDirectory, SwapTable};

const SWAP_DISK: usize = 3;

pub fn alloc_installs_mapping() {
    let frames = FrameTable::new(2);
    let swap = SwapTable::new(Disk::new(SWAP_DISK));
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let up = Va::new(0x4000_0000).expect("valid user address");

    let pa = frames
        .frame_alloc(&pd, &swap, up, true)
        .expect("frame_alloc must succeed while frames are free");
    assert_eq!(pd.get_page(up), Some(pa));
}

pub fn free_unmaps_every_frame_owned_by_a_pagedir() {
    let frames = FrameTable::new(4);
    let swap = SwapTable::new(Disk::new(SWAP_DISK));
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let up_a = Va::new(0x4000_0000).unwrap();
    let up_b = Va::new(0x4000_1000).unwrap();

    frames.frame_alloc(&pd, &swap, up_a, true).expect("frame_alloc a");
    frames.frame_alloc(&pd, &swap, up_b, false).expect("frame_alloc b");

    frames.frame_free(&pd);

    // Both frames must be reusable now: a table with only two frames can
    // still satisfy two more allocations without running eviction.
    let other: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let up_c = Va::new(0x4000_2000).unwrap();
    let up_d = Va::new(0x4000_3000).unwrap();
    frames
        .frame_alloc(&other, &swap, up_c, true)
        .expect("frame_free must have returned both frames to the free pool");
    frames
        .frame_alloc(&other, &swap, up_d, true)
        .expect("frame_free must have returned both frames to the free pool");
}

/// With a single-frame table, allocating a second user page must evict the
/// first: the victim's hardware mapping is cleared and its sup-page is
/// transitioned to a swap slot.
pub fn second_chance_eviction_clears_the_victim_mapping() {
    let frames = FrameTable::new(1);
    let swap = SwapTable::new(Disk::new(SWAP_DISK));
    let pd: Arc<dyn PageDirectory> = FakePageDirectory::shared();
    let up_a = Va::new(0x4000_0000).unwrap();
    let up_b = Va::new(0x4000_1000).unwrap();

    let pa1 = frames.frame_alloc(&pd, &swap, up_a, true).expect("frame_alloc a");
    assert_eq!(pd.get_page(up_a), Some(pa1));

    frames.frame_alloc(&pd, &swap, up_b, true).expect("frame_alloc b must evict a");
    assert!(pd.get_page(up_a).is_none(), "the evicted page's hardware mapping must be cleared");
    assert!(pd.get_page(up_b).is_some());
}
