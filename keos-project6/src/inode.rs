//! The inode layer: on-disk extent maps, an open-inode registry enforcing
//! open-uniqueness, and byte-level read/write on top of the buffer cache.

use crate::{
    cache::BufferCache,
    config::{INDIRECT_LEN, MAX_INODE_LEN, NONE_SECTOR, NUM_DIRECT, NUM_INDIRECT, SECTOR_SIZE},
    external::FreeMap,
};
use alloc::{collections::BTreeMap, sync::Arc};
use keos::{
    KernelError,
    fs::Sector,
    sync::{RwLock, SpinLock},
};

/// Asserts a compile-time constant, the way `keos-project5` checks its own
/// on-disk struct sizes.
macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    };
}

const MAGIC: u32 = 0x494e_4f44;

/// The 512-byte on-disk inode: a length, a magic number, and a two-level
/// extent map (direct pointers, then singly-indirect pointers).
#[repr(C)]
#[derive(Clone, Copy)]
struct OnDiskInode {
    length: i32,
    magic: u32,
    direct: [u16; NUM_DIRECT],
    indirect: [u16; NUM_INDIRECT],
}

const_assert!(core::mem::size_of::<OnDiskInode>() == SECTOR_SIZE);

impl OnDiskInode {
    fn empty() -> Self {
        Self {
            length: 0,
            magic: MAGIC,
            direct: [NONE_SECTOR; NUM_DIRECT],
            indirect: [NONE_SECTOR; NUM_INDIRECT],
        }
    }

    fn to_bytes(self) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        let mut off = 0;
        buf[off..off + 4].copy_from_slice(&self.length.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.magic.to_le_bytes());
        off += 4;
        for d in &self.direct {
            buf[off..off + 2].copy_from_slice(&d.to_le_bytes());
            off += 2;
        }
        for d in &self.indirect {
            buf[off..off + 2].copy_from_slice(&d.to_le_bytes());
            off += 2;
        }
        buf
    }

    fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Result<Self, KernelError> {
        let length = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let magic = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if magic != MAGIC {
            return Err(KernelError::FilesystemCorrupted("inode magic mismatch"));
        }
        let mut direct = [0u16; NUM_DIRECT];
        let mut off = 8;
        for d in direct.iter_mut() {
            *d = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
            off += 2;
        }
        let mut indirect = [0u16; NUM_INDIRECT];
        for d in indirect.iter_mut() {
            *d = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
            off += 2;
        }
        Ok(Self {
            length,
            magic,
            direct,
            indirect,
        })
    }
}

struct InodeState {
    open_cnt: usize,
    deny_write_cnt: usize,
    removed: bool,
    disk: OnDiskInode,
}

/// One open inode. Shared by every opener of the same sector.
pub struct Inode {
    sector: Sector,
    state: RwLock<InodeState>,
}

impl Inode {
    /// Current byte length.
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.disk.length as usize
    }

    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// Marks this inode for deletion once the last opener closes it.
    pub fn mark_removed(&self) {
        let mut state = self.state.write();
        state.removed = true;
    }

    pub fn is_removed(&self) -> bool {
        let state = self.state.read();
        state.removed
    }

    /// Bumps the deny-write count. Further writers observe 0 bytes written
    /// until a matching `allow_write`.
    pub fn deny_write(&self) {
        let mut state = self.state.write();
        state.deny_write_cnt += 1;
        assert!(state.deny_write_cnt <= state.open_cnt);
    }

    pub fn allow_write(&self) {
        let mut state = self.state.write();
        assert!(state.deny_write_cnt > 0);
        state.deny_write_cnt -= 1;
    }

    /// Copies up to `buf.len()` bytes starting at `position` into `buf`.
    /// Bytes past the current length are not read; the return value is the
    /// number actually copied.
    pub fn read_at(
        &self,
        cache: &BufferCache,
        buf: &mut [u8],
        position: usize,
    ) -> Result<usize, KernelError> {
        let state = self.state.read();
        let length = state.disk.length as usize;
        if position >= length {
            return Ok(0);
        }
        let to_read = buf.len().min(length - position);
        let mut done = 0;
        while done < to_read {
            let pos = position + done;
            let sector_ofs = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_ofs).min(to_read - done);
            let sector = byte_to_sector(&state.disk, cache, pos)?;
            cache.cache_read(sector, &mut buf[done..done + chunk], sector_ofs, chunk)?;
            done += chunk;
        }
        Ok(done)
    }

    /// Extends the inode (if needed) to cover `position + buf.len()`, then
    /// writes as much of `buf` as the achieved length allows. Returns the
    /// number of bytes actually written; a short write means the device ran
    /// out of free sectors partway through growth. Writes nothing, and
    /// returns 0, while a deny-write is outstanding.
    pub fn write_at(
        &self,
        cache: &BufferCache,
        free_map: &dyn FreeMap,
        buf: &[u8],
        position: usize,
    ) -> Result<usize, KernelError> {
        let mut state = self.state.write();
        if state.deny_write_cnt > 0 {
            return Ok(0);
        }
        let target = (position + buf.len()).min(MAX_INODE_LEN);
        let achieved = extend_disk(&mut state, cache, free_map, target);
        if achieved <= position {
            return Ok(0);
        }
        let to_write = (achieved - position).min(buf.len());
        let mut done = 0;
        while done < to_write {
            let pos = position + done;
            let sector_ofs = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_ofs).min(to_write - done);
            let sector = byte_to_sector(&state.disk, cache, pos)?;
            cache.cache_write(sector, &buf[done..done + chunk], sector_ofs, chunk)?;
            done += chunk;
        }
        persist(cache, self.sector, &state.disk)?;
        Ok(done)
    }
}

/// Maps a byte position to the data sector that holds it. `pos` must be
/// less than the inode's current length (the caller is responsible for
/// having grown the inode first).
fn byte_to_sector(disk: &OnDiskInode, cache: &BufferCache, pos: usize) -> Result<Sector, KernelError> {
    let i = pos / SECTOR_SIZE;
    if i < NUM_DIRECT {
        let s = disk.direct[i];
        debug_assert_ne!(s, NONE_SECTOR, "byte_to_sector: direct slot not allocated");
        Ok(Sector(s as usize))
    } else {
        let k = i - NUM_DIRECT;
        let j = k / INDIRECT_LEN;
        let o = k % INDIRECT_LEN;
        let ind = disk.indirect[j];
        debug_assert_ne!(ind, NONE_SECTOR, "byte_to_sector: indirect slot not allocated");
        let mut raw = [0u8; 2];
        cache.cache_read(Sector(ind as usize), &mut raw, o * 2, 2)?;
        let s = u16::from_le_bytes(raw);
        debug_assert_ne!(s, NONE_SECTOR, "byte_to_sector: data slot not allocated");
        Ok(Sector(s as usize))
    }
}

/// Allocates a sector from `free_map`, failing (and releasing it back) if
/// its id does not fit the on-disk `u16` encoding.
fn allocate_u16_sector(free_map: &dyn FreeMap) -> Option<Sector> {
    let s = free_map.allocate()?;
    if s.into_usize() > u16::MAX as usize {
        free_map.release(s);
        None
    } else {
        Some(s)
    }
}

/// Allocates and zero-fills the data sector covering `[i * SECTOR_SIZE,
/// (i+1) * SECTOR_SIZE)`, growing into the indirect block first if `i`
/// crosses out of the direct range and no indirect sector covers it yet.
/// On any failure, anything this call allocated is rolled back; an
/// indirect sector allocated by an earlier call is left untouched.
fn append_sector(state: &mut InodeState, cache: &BufferCache, free_map: &dyn FreeMap, i: usize) -> bool {
    if i < NUM_DIRECT {
        let Some(s) = allocate_u16_sector(free_map) else {
            return false;
        };
        if cache.cache_zero(s).is_err() {
            free_map.release(s);
            return false;
        }
        state.disk.direct[i] = s.into_usize() as u16;
        true
    } else {
        let k = i - NUM_DIRECT;
        let j = k / INDIRECT_LEN;
        let o = k % INDIRECT_LEN;
        let crossed_new_indirect = state.disk.indirect[j] == NONE_SECTOR;
        if crossed_new_indirect {
            let Some(ind) = allocate_u16_sector(free_map) else {
                return false;
            };
            if cache.cache_zero(ind).is_err() {
                free_map.release(ind);
                return false;
            }
            state.disk.indirect[j] = ind.into_usize() as u16;
        }
        let ind_sector = Sector(state.disk.indirect[j] as usize);
        let Some(data) = allocate_u16_sector(free_map) else {
            if crossed_new_indirect {
                free_map.release(ind_sector);
                state.disk.indirect[j] = NONE_SECTOR;
            }
            return false;
        };
        if cache.cache_zero(data).is_err() {
            free_map.release(data);
            if crossed_new_indirect {
                free_map.release(ind_sector);
                state.disk.indirect[j] = NONE_SECTOR;
            }
            return false;
        }
        let bytes = (data.into_usize() as u16).to_le_bytes();
        if cache.cache_write(ind_sector, &bytes, o * 2, 2).is_err() {
            free_map.release(data);
            if crossed_new_indirect {
                free_map.release(ind_sector);
                state.disk.indirect[j] = NONE_SECTOR;
            }
            return false;
        }
        true
    }
}

/// Grows the inode to cover `new_length`, appending sectors one at a time
/// starting from the next sector boundary past the current length. Stops
/// early if the device runs out of sectors, leaving length at the last
/// fully-appended sector boundary; on full success, length becomes exactly
/// `new_length` rather than the sector-aligned upper bound. A no-op (returns
/// the current length unchanged) if `new_length` does not exceed it.
fn extend_disk(state: &mut InodeState, cache: &BufferCache, free_map: &dyn FreeMap, new_length: usize) -> usize {
    let length = state.disk.length as usize;
    if new_length <= length {
        return length;
    }
    let mut rounded = length.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    while rounded < new_length {
        let sector_index = rounded / SECTOR_SIZE;
        if !append_sector(state, cache, free_map, sector_index) {
            state.disk.length = rounded as i32;
            return rounded;
        }
        rounded += SECTOR_SIZE;
    }
    state.disk.length = new_length as i32;
    new_length
}

/// Releases every sector this inode currently owns: its data sectors (via
/// the same addressing walk reads use), every indirect sector it ever
/// allocated (regardless of whether `length` still reaches that far), and
/// finally its own sector.
fn release_inode_sectors(sector: Sector, disk: &OnDiskInode, cache: &BufferCache, free_map: &dyn FreeMap) {
    let length = disk.length as usize;
    let mut pos = 0;
    while pos < length {
        if let Ok(s) = byte_to_sector(disk, cache, pos) {
            free_map.release(s);
        }
        pos += SECTOR_SIZE;
    }
    for &ind in &disk.indirect {
        if ind != NONE_SECTOR {
            free_map.release(Sector(ind as usize));
        }
    }
    free_map.release(sector);
}

fn persist(cache: &BufferCache, sector: Sector, disk: &OnDiskInode) -> Result<(), KernelError> {
    cache.cache_write(sector, &disk.to_bytes(), 0, SECTOR_SIZE)
}

/// Tracks every currently-open inode, keyed by its sector, so that two
/// opens of the same file share one in-memory `Inode` and one lock.
pub struct InodeRegistry {
    inodes: SpinLock<BTreeMap<Sector, Arc<Inode>>>,
}

impl Default for InodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeRegistry {
    pub fn new() -> Self {
        Self {
            inodes: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Formats a fresh inode at `sector` (already allocated by the caller's
    /// free-map) with `length` bytes of zero-filled content.
    pub fn create(
        &self,
        cache: &BufferCache,
        free_map: &dyn FreeMap,
        sector: Sector,
        length: usize,
    ) -> Result<(), KernelError> {
        let mut state = InodeState {
            open_cnt: 0,
            deny_write_cnt: 0,
            removed: false,
            disk: OnDiskInode::empty(),
        };
        let length = length.min(MAX_INODE_LEN);
        let achieved = extend_disk(&mut state, cache, free_map, length);
        if achieved < length {
            release_inode_sectors(sector, &state.disk, cache, free_map);
            return Err(KernelError::NoSpace);
        }
        persist(cache, sector, &state.disk)
    }

    /// Opens `sector`, sharing the existing in-memory inode if another
    /// opener already holds it, otherwise loading it from disk.
    pub fn open(&self, cache: &BufferCache, sector: Sector) -> Result<Arc<Inode>, KernelError> {
        let mut registry = self.inodes.lock();
        if let Some(inode) = registry.get(&sector) {
            let inode = inode.clone();
            registry.unlock();
            let mut state = inode.state.write();
            state.open_cnt += 1;
            return Ok(inode);
        }
        let mut raw = [0u8; SECTOR_SIZE];
        let result = cache
            .cache_read(sector, &mut raw, 0, SECTOR_SIZE)
            .and_then(|()| OnDiskInode::from_bytes(&raw));
        let disk = match result {
            Ok(disk) => disk,
            Err(e) => {
                registry.unlock();
                return Err(e);
            }
        };
        let inode = Arc::new(Inode {
            sector,
            state: RwLock::new(InodeState {
                open_cnt: 1,
                deny_write_cnt: 0,
                removed: false,
                disk,
            }),
        });
        registry.insert(sector, inode.clone());
        registry.unlock();
        Ok(inode)
    }

    /// Drops one reference to `inode`. Once the last opener closes it, the
    /// registry entry is removed and, if the inode was marked for removal,
    /// every sector it owns (data, indirect, and its own) is released.
    pub fn close(&self, inode: &Arc<Inode>, cache: &BufferCache, free_map: &dyn FreeMap) {
        let mut registry = self.inodes.lock();
        let (open_cnt, removed, disk) = {
            let mut state = inode.state.write();
            state.open_cnt -= 1;
            (state.open_cnt, state.removed, state.disk)
        };
        if open_cnt == 0 {
            registry.remove(&inode.sector);
        }
        registry.unlock();
        if open_cnt == 0 && removed {
            release_inode_sectors(inode.sector, &disk, cache, free_map);
        }
    }
}
