//! Abstract interfaces to collaborators this crate does not own.
//!
//! Nothing in this module is implemented here; these traits are injected by
//! whatever owns the free-map bitmap allocator and the hardware page
//! directory. Keeping them as traits (rather than reaching for a concrete
//! `keos-project2`/`keos-project3` type) avoids pulling a half-finished
//! student exercise into this crate's dependency graph.

use crate::sup_page::SupplementalPageTable;
use keos::{
    addressing::{Pa, Va},
    fs::Sector,
    mm::page_table::Permission,
};

/// The free-map bitmap allocator.
pub trait FreeMap: Send + Sync {
    /// Allocates a fresh sector, or `None` if the device is full.
    fn allocate(&self) -> Option<Sector>;
    /// Releases a previously allocated sector back to the map.
    fn release(&self, sector: Sector);
}

/// The hardware page-directory interface.
///
/// One implementation of this trait exists per process address space. The
/// virtual-memory subsystem (frame table, supplemental page table) is
/// generic over `PageDirectory` rather than hard-coding a single process
/// model.
pub trait PageDirectory: Send + Sync {
    /// Looks up the physical frame currently mapped at `uaddr`, if any.
    fn get_page(&self, uaddr: Va) -> Option<Pa>;
    /// Installs a mapping from `uaddr` to `frame` with the given permission.
    fn set_page(&self, uaddr: Va, frame: Pa, perm: Permission) -> bool;
    /// Removes whatever mapping exists at `uaddr`.
    fn clear_page(&self, uaddr: Va);
    /// Reads the hardware accessed bit for `uaddr`.
    fn is_accessed(&self, uaddr: Va) -> bool;
    /// Sets the hardware accessed bit for `uaddr`.
    fn set_accessed(&self, uaddr: Va, value: bool);
    /// Reads the hardware dirty bit for `uaddr`.
    fn is_dirty(&self, uaddr: Va) -> bool;
    /// Sets the hardware dirty bit for `uaddr`.
    fn set_dirty(&self, uaddr: Va, value: bool);
    /// Accesses this pagedir's supplemental page table.
    ///
    /// A frame's back-reference to its owning address space is a
    /// `Weak<dyn PageDirectory>`; eviction reaches the victim's sup-page
    /// table through this single method instead of a thread-local lookup.
    fn sup_page_table(&self) -> &SupplementalPageTable;
}
