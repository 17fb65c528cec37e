//! Compile-time tunables.
//!
//! KeOS has no runtime configuration file; every `keos-projectN` crate bakes
//! its tunables in as `const`s (see e.g. `keos::addressing::PAGE_SIZE`). This
//! module follows the same convention for every numeric knob this crate
//! treats as a named constant rather than a derived value.

pub use keos::addressing::PAGE_SIZE;

/// Number of entries in the buffer cache pool.
pub const CACHE_SIZE: usize = 64;

/// Write-behind period, expressed in the same "tick" unit the original
/// Pintos source uses (`WRITE_BEHIND_PERIOD` in `filesys/cache.c`).
pub const WRITE_BEHIND_PERIOD_TICKS: usize = 15;

/// Number of direct block pointers in an on-disk inode.
pub const NUM_DIRECT: usize = 188;

/// Number of singly-indirect block pointers in an on-disk inode.
pub const NUM_INDIRECT: usize = 64;

/// Number of data-sector pointers held by one indirect sector.
pub const INDIRECT_LEN: usize = 256;

/// Largest byte offset an inode can address.
pub const MAX_INODE_LEN: usize = 8 * 1024 * 1024;

/// Hard cap on automatic stack growth.
pub const STACK_GROWTH_LIMIT: usize = 8 * 1024 * 1024;

/// Sectors occupied by one swap slot.
pub const SWAP_SLOT_SECTORS: usize = PAGE_SIZE / 512;

/// Byte size of one sector, the buffer cache's unit of work.
pub const SECTOR_SIZE: usize = 512;

/// Sentinel "no sector" value used by the on-disk inode encoding.
pub const NONE_SECTOR: u16 = 0xFFFF;

/// Exclusive upper bound of the user half of the virtual address space.
pub const USER_TOP: usize = 0x0000_8000_0000_0000;
