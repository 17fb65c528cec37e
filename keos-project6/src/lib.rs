//! # Project 6: Storage and Virtual Memory
//!
//! Project 6 builds the two hardest layers of a Unix-like kernel: the
//! on-disk storage stack and the demand-paging virtual-memory subsystem.
//!
//! The storage side is a **write-back buffer cache** ([`cache`]) fronting a
//! sector-addressable block device, and an **inode layer** ([`inode`]) that
//! builds a two-level (direct + singly-indirect) extent map and lazy file
//! growth on top of it. The VM side is a global **frame table** ([`frame`])
//! with second-chance clock eviction, a per-process **supplemental page
//! table** ([`sup_page`]) describing where an unmapped page's contents
//! actually live, and a **swap area** ([`swap`]) that the frame table evicts
//! into.
//!
//! None of these four pieces know about processes, system calls, or
//! hardware page tables directly — they are generic over the collaborator
//! traits in [`external`] ([`external::FreeMap`], [`external::PageDirectory`]),
//! which the owning process/file-system layer implements and injects.
//!
//! ## Getting Started
//!
//! To get started, navigate to the `keos-project6/grader` directory and run:
//!
//! ```bash
//! $ cargo run
//! ```
//!
//! ## Modifiable Files
//! In this project, you can modify the following files:
//! - `cache.rs`
//! - `inode.rs`
//! - `frame.rs`
//! - `sup_page.rs`
//! - `swap.rs`
//!
//! ## Project Outline
//! - [`Buffer Cache`]: a fixed pool of sector-sized entries with
//!   second-chance eviction and a background write-behind thread.
//! - [`Inode Layer`]: on-disk inodes, byte-ranged read/write, and an
//!   open-uniqueness registry.
//! - [`Frame Table`]: the physical frame pool shared by every process.
//! - [`Supplemental Page Table`]: per-process page-fault resolution.
//! - [`Swap`]: the backing store frame eviction writes into.
//!
//! [`Buffer Cache`]: cache
//! [`Inode Layer`]: inode
//! [`Frame Table`]: frame
//! [`Supplemental Page Table`]: sup_page
//! [`Swap`]: swap

#![no_std]
#![no_main]
#![deny(rustdoc::broken_intra_doc_links)]

extern crate alloc;
#[allow(unused_imports)]
#[macro_use]
extern crate keos;

pub mod cache;
pub mod config;
pub mod external;
pub mod frame;
pub mod inode;
pub mod sup_page;
pub mod swap;

pub use cache::BufferCache;
pub use external::{FreeMap, PageDirectory};
pub use frame::FrameTable;
pub use inode::{Inode, InodeRegistry};
pub use sup_page::{SupplementalPageTable, page_fetch};
pub use swap::{SwapSlot, SwapTable};

/// The storage and virtual-memory core, bundling the four subsystems that
/// an owning process/file-system layer wires together.
///
/// This is a thin convenience aggregate, not a required entry point — every
/// field is independently usable (and independently testable) through its
/// own module. A process layer is free to hold these four pieces
/// separately instead; `StorageCore` exists because every `keos-projectN`
/// crate that composes more than one subsystem (e.g. `keos-project5`'s
/// `PageCache` wrapping `FastFileSystem`) exposes a single top-level type
/// wiring its pieces together, and project6 is no exception.
pub struct StorageCore {
    /// The buffer cache fronting the filesystem disk.
    pub cache: alloc::sync::Arc<BufferCache>,
    /// The open-inode registry built on top of `cache`.
    pub inodes: InodeRegistry,
    /// The global frame table.
    pub frames: FrameTable,
    /// The swap area frame eviction writes into.
    pub swap: SwapTable,
}

impl StorageCore {
    /// Wires up a fresh storage/VM core over `fs_disk` (inode + cache
    /// storage) and `swap_disk` (the swap area), with `num_frames` frames
    /// drained from the physical-page allocator.
    pub fn new(fs_disk: keos::fs::Disk, swap_disk: keos::fs::Disk, num_frames: usize) -> Self {
        Self {
            cache: BufferCache::new(fs_disk),
            inodes: InodeRegistry::new(),
            frames: FrameTable::new(num_frames),
            swap: SwapTable::new(swap_disk),
        }
    }
}
