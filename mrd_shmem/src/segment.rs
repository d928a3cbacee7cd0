//! Named shared-memory segments with an in-segment allocator.
//!
//! A [`Segment`] is one POSIX shared-memory object plus its co-named
//! [`ShmRwLock`]. The first page holds a [`SegmentHeader`]: magic, allocator
//! state and a small named-object directory used to locate containers (the
//! sensor map registers itself under `<segment>map`). Everything behind the
//! header is heap managed by a first-fit free list with a bump tail.
//!
//! All intra-segment references are byte offsets from the segment base, so
//! peer processes mapping the object at different addresses agree on the
//! structure.

use crate::error::{ShmError, ShmResult};
use crate::lock::ShmRwLock;
use memmap2::{Mmap, MmapMut};
use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::stat::Mode;
use nix::unistd;
use static_assertions::const_assert_eq;
use std::fs::File;
use std::os::fd::AsRawFd;
use tracing::info;

/// Magic bytes identifying a valid segment: `"MRDSHM1\0"`.
const SEGMENT_MAGIC: u64 = u64::from_ne_bytes(*b"MRDSHM1\0");

/// Suffix appended to a segment name to derive its lock object name.
pub const LOCK_SUFFIX: &str = "lock";

/// Maximum named objects per segment. One is used today (the map root).
const DIR_CAPACITY: usize = 8;

/// Maximum length of a named-object name in bytes.
const DIR_NAME_MAX: usize = 64;

/// Allocation granularity; every payload offset is a multiple of this.
const ALLOC_ALIGN: u64 = 8;

/// Minimum leftover worth splitting off as a new free block.
const MIN_SPLIT: u64 = 32;

/// Directory slot mapping a container name to its heap offset.
#[repr(C)]
struct DirEntry {
    name: [u8; DIR_NAME_MAX],
    name_len: u32,
    _pad: u32,
    /// Heap offset of the object; 0 marks an empty slot.
    off: u64,
}

const_assert_eq!(std::mem::size_of::<DirEntry>(), 80);

/// Header at offset 0 of every segment.
#[repr(C)]
struct SegmentHeader {
    magic: u64,
    total_size: u64,
    /// Offset of the next never-allocated byte.
    bump: u64,
    /// Offset of the first free block header; 0 when the list is empty.
    free_head: u64,
    dir: [DirEntry; DIR_CAPACITY],
}

const_assert_eq!(std::mem::size_of::<SegmentHeader>(), 32 + 80 * DIR_CAPACITY);

/// Header preceding every heap block. `next` is meaningful only while the
/// block sits on the free list.
#[repr(C)]
struct BlockHeader {
    size: u64,
    next: u64,
}

const BLOCK_HEADER_SIZE: u64 = std::mem::size_of::<BlockHeader>() as u64;
const_assert_eq!(std::mem::size_of::<BlockHeader>(), 16);

/// Access mode a segment handle was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Created by the owning producer; mutations allowed.
    ReadWrite,
    /// Opened by a consumer; mutations are a permission error.
    ReadOnly,
}

enum Mapping {
    Rw(MmapMut),
    Ro(Mmap),
}

impl Mapping {
    fn base(&self) -> *mut u8 {
        match self {
            Mapping::Rw(m) => m.as_ptr() as *mut u8,
            Mapping::Ro(m) => m.as_ptr() as *mut u8,
        }
    }

    fn len(&self) -> usize {
        match self {
            Mapping::Rw(m) => m.len(),
            Mapping::Ro(m) => m.len(),
        }
    }
}

/// Build the POSIX shm path for a segment name (`"name"` → `"/name"`).
fn shm_path(name: &str) -> String {
    format!("/{name}")
}

/// A named shared-memory segment and its co-named lock.
pub struct Segment {
    mapping: Mapping,
    /// Keeps the shm object's descriptor open for the handle lifetime.
    _file: File,
    lock: ShmRwLock,
    name: String,
    mode: AccessMode,
}

// SAFETY: the raw segment memory is only mutated while holding the
// exclusive side of the co-named lock, and read under the shared side;
// the handle fields themselves are plain owned data.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Remove any pre-existing segment and lock of this name, then create a
    /// fresh segment of `bytes` capacity with an empty heap.
    ///
    /// Peers that have not yet opened the old object observe the removal
    /// atomically: the name transitions directly to the new object.
    pub fn create(name: &str, bytes: usize) -> ShmResult<Self> {
        let path = shm_path(name);
        match mman::shm_unlink(path.as_str()) {
            Ok(()) => {}
            Err(nix::errno::Errno::ENOENT) => {
                info!(segment = name, "segment does not exist, remove skipped");
            }
            Err(e) => {
                return Err(ShmError::Os {
                    segment: name.to_string(),
                    source: e,
                });
            }
        }

        let fd = mman::shm_open(
            path.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(|e| ShmError::Os {
            segment: name.to_string(),
            source: e,
        })?;

        unistd::ftruncate(&fd, bytes as libc::off_t).map_err(|e| ShmError::Os {
            segment: name.to_string(),
            source: e,
        })?;

        let file = File::from(fd);
        let mut map = unsafe {
            MmapMut::map_mut(&file).map_err(|e| ShmError::Io {
                segment: name.to_string(),
                source: e,
            })?
        };

        let header = map.as_mut_ptr() as *mut SegmentHeader;
        // SAFETY: the mapping is `bytes` long (ftruncate above) and freshly
        // zeroed; the header fits because callers size segments in KB+.
        unsafe {
            (*header).total_size = bytes as u64;
            (*header).bump = std::mem::size_of::<SegmentHeader>() as u64;
            (*header).free_head = 0;
            // Directory slots are already zeroed (off == 0 marks empty).
            (*header).magic = SEGMENT_MAGIC;
        }

        let lock = ShmRwLock::create(&format!("{name}{LOCK_SUFFIX}"))?;

        Ok(Self {
            mapping: Mapping::Rw(map),
            _file: file,
            lock,
            name: name.to_string(),
            mode: AccessMode::ReadWrite,
        })
    }

    /// Open an existing segment and its lock read-only. Fails cleanly when
    /// either is absent.
    pub fn open_readonly(name: &str) -> ShmResult<Self> {
        let path = shm_path(name);
        let fd = mman::shm_open(path.as_str(), OFlag::O_RDONLY, Mode::empty()).map_err(|e| {
            if e == nix::errno::Errno::ENOENT {
                ShmError::NotFound {
                    segment: name.to_string(),
                }
            } else {
                ShmError::Os {
                    segment: name.to_string(),
                    source: e,
                }
            }
        })?;

        let stat = nix::sys::stat::fstat(fd.as_raw_fd()).map_err(|e| ShmError::Os {
            segment: name.to_string(),
            source: e,
        })?;
        if (stat.st_size as usize) < std::mem::size_of::<SegmentHeader>() {
            return Err(ShmError::InvalidSegment {
                segment: name.to_string(),
            });
        }

        let file = File::from(fd);
        let map = unsafe {
            Mmap::map(&file).map_err(|e| ShmError::Io {
                segment: name.to_string(),
                source: e,
            })?
        };

        let header = map.as_ptr() as *const SegmentHeader;
        // SAFETY: size validated against the header above.
        let valid = unsafe {
            (*header).magic == SEGMENT_MAGIC && (*header).total_size as usize <= map.len()
        };
        if !valid {
            return Err(ShmError::InvalidSegment {
                segment: name.to_string(),
            });
        }

        let lock = ShmRwLock::open(&format!("{name}{LOCK_SUFFIX}"))?;

        Ok(Self {
            mapping: Mapping::Ro(map),
            _file: file,
            lock,
            name: name.to_string(),
            mode: AccessMode::ReadOnly,
        })
    }

    /// Segment name (without the leading `/`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access mode this handle was opened with.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// The co-named cross-process lock.
    pub fn lock(&self) -> &ShmRwLock {
        &self.lock
    }

    fn header(&self) -> *mut SegmentHeader {
        self.mapping.base() as *mut SegmentHeader
    }

    /// Raw pointer to `off` bytes into the segment.
    ///
    /// # Safety
    /// `off` must come from this segment's allocator or directory and the
    /// access must respect the handle's access mode and locking discipline.
    pub unsafe fn ptr_at(&self, off: u64) -> *mut u8 {
        debug_assert!((off as usize) < self.mapping.len());
        self.mapping.base().add(off as usize)
    }

    /// Free space available to the allocator: untouched tail plus the sum
    /// of free-list payloads. Lock-free best-effort read for observability.
    pub fn free_bytes(&self) -> usize {
        let header = self.header();
        // SAFETY: the header is present and validated at open time.
        unsafe {
            let total = (*header).total_size;
            let tail = total.saturating_sub((*header).bump);
            let mut free = 0u64;
            let mut cursor = (*header).free_head;
            // Concurrent writers may be reshaping the list; stay in bounds
            // rather than chasing a torn offset.
            while cursor != 0 && cursor + BLOCK_HEADER_SIZE <= total {
                let block = self.ptr_at(cursor) as *const BlockHeader;
                free += (*block).size;
                cursor = (*block).next;
            }
            (tail + free) as usize
        }
    }

    /// Allocate `size` bytes from the heap; returns the payload offset.
    ///
    /// Writer-side only; callers must hold the exclusive lock.
    pub fn alloc(&self, size: usize) -> ShmResult<u64> {
        debug_assert_eq!(self.mode, AccessMode::ReadWrite);
        let want = (size as u64).max(ALLOC_ALIGN).next_multiple_of(ALLOC_ALIGN);
        let header = self.header();

        // SAFETY: writer-exclusive access to allocator state is guaranteed
        // by the caller holding the segment write lock.
        unsafe {
            // First fit over the free list.
            let mut prev: *mut u64 = &mut (*header).free_head;
            let mut cursor = (*header).free_head;
            while cursor != 0 {
                let block = self.ptr_at(cursor) as *mut BlockHeader;
                if (*block).size >= want {
                    if (*block).size >= want + BLOCK_HEADER_SIZE + MIN_SPLIT {
                        // Split: keep the front for the caller, push the rest
                        // back as a smaller free block.
                        let rest_off = cursor + BLOCK_HEADER_SIZE + want;
                        let rest = self.ptr_at(rest_off) as *mut BlockHeader;
                        (*rest).size = (*block).size - want - BLOCK_HEADER_SIZE;
                        (*rest).next = (*block).next;
                        (*block).size = want;
                        *prev = rest_off;
                    } else {
                        *prev = (*block).next;
                    }
                    (*block).next = 0;
                    return Ok(cursor + BLOCK_HEADER_SIZE);
                }
                prev = &mut (*block).next;
                cursor = (*block).next;
            }

            // Bump from the tail.
            let block_off = (*header).bump;
            let end = block_off + BLOCK_HEADER_SIZE + want;
            if end > (*header).total_size {
                return Err(ShmError::OutOfMemory {
                    segment: self.name.clone(),
                    requested: size,
                });
            }
            let block = self.ptr_at(block_off) as *mut BlockHeader;
            (*block).size = want;
            (*block).next = 0;
            (*header).bump = end;
            Ok(block_off + BLOCK_HEADER_SIZE)
        }
    }

    /// Return a payload previously handed out by [`Segment::alloc`].
    ///
    /// The block is inserted address-ordered and coalesced with adjacent
    /// free neighbors to keep long-running producers from fragmenting.
    pub fn dealloc(&self, payload_off: u64) {
        debug_assert_eq!(self.mode, AccessMode::ReadWrite);
        if payload_off == 0 {
            return;
        }
        let header = self.header();
        let block_off = payload_off - BLOCK_HEADER_SIZE;

        // SAFETY: same exclusivity argument as `alloc`; `payload_off` was
        // produced by this allocator per the caller contract.
        unsafe {
            let block = self.ptr_at(block_off) as *mut BlockHeader;

            // Find the address-ordered insertion point.
            let mut prev_off = 0u64;
            let mut cursor = (*header).free_head;
            while cursor != 0 && cursor < block_off {
                prev_off = cursor;
                cursor = (*(self.ptr_at(cursor) as *const BlockHeader)).next;
            }

            (*block).next = cursor;
            if prev_off == 0 {
                (*header).free_head = block_off;
            } else {
                (*(self.ptr_at(prev_off) as *mut BlockHeader)).next = block_off;
            }

            // Coalesce forward.
            if cursor != 0 && block_off + BLOCK_HEADER_SIZE + (*block).size == cursor {
                let next = self.ptr_at(cursor) as *const BlockHeader;
                (*block).size += BLOCK_HEADER_SIZE + (*next).size;
                (*block).next = (*next).next;
            }

            // Coalesce backward.
            if prev_off != 0 {
                let prev = self.ptr_at(prev_off) as *mut BlockHeader;
                if prev_off + BLOCK_HEADER_SIZE + (*prev).size == block_off {
                    (*prev).size += BLOCK_HEADER_SIZE + (*block).size;
                    (*prev).next = (*block).next;
                }
            }
        }
    }

    /// Look up a named object registered in the directory.
    pub fn dir_find(&self, name: &str) -> Option<u64> {
        let header = self.header();
        // SAFETY: directory slots live inside the validated header.
        unsafe {
            for entry in &(*header).dir {
                if entry.off != 0
                    && entry.name_len as usize == name.len()
                    && &entry.name[..name.len()] == name.as_bytes()
                {
                    return Some(entry.off);
                }
            }
        }
        None
    }

    /// Register a named object. Writer-side only.
    pub fn dir_insert(&self, name: &str, off: u64) -> ShmResult<()> {
        debug_assert_eq!(self.mode, AccessMode::ReadWrite);
        debug_assert!(name.len() <= DIR_NAME_MAX);
        let header = self.header();
        // SAFETY: writer-exclusive per the locking discipline.
        unsafe {
            for entry in &mut (*header).dir {
                if entry.off == 0 {
                    entry.name[..name.len()].copy_from_slice(name.as_bytes());
                    entry.name_len = name.len() as u32;
                    entry.off = off;
                    return Ok(());
                }
            }
        }
        Err(ShmError::OutOfMemory {
            segment: self.name.clone(),
            requested: std::mem::size_of::<DirEntry>(),
        })
    }
}
