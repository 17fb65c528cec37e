//! Exercises the swap area: the `swap_out` / `swap_in` round trip and slot
//! recycling via the `free` list.

use keos::fs::Disk;
use keos_project6::{SwapTable, config::PAGE_SIZE};

const DISK: usize = 3;

pub fn round_trip() {
    let swap = SwapTable::new(Disk::new(DISK));
    let mut page = [0u8; PAGE_SIZE];
    for (i, b) in page.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }

    let slot = swap.swap_out(&page).expect("swap_out must succeed");
    let mut back = [0u8; PAGE_SIZE];
    swap.swap_in(slot, &mut back).expect("swap_in must succeed");
    assert_eq!(&page[..], &back[..], "swap_in must return exactly what swap_out wrote");
}

pub fn slots_are_recycled() {
    let swap = SwapTable::new(Disk::new(DISK));
    let page_a = [0xAAu8; PAGE_SIZE];
    let page_b = [0xBBu8; PAGE_SIZE];

    let slot1 = swap.swap_out(&page_a).expect("first swap_out must succeed");
    let mut buf = [0u8; PAGE_SIZE];
    swap.swap_in(slot1, &mut buf).expect("swap_in must succeed");

    let slot2 = swap.swap_out(&page_b).expect("second swap_out must succeed");
    assert_eq!(slot1, slot2, "a freed slot must be recycled before carving a new one");
}
