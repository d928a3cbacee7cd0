//! Cross-process reader/writer lock backed by a named shared-memory object.
//!
//! Every sensor map segment is paired with a co-named lock object
//! (`<segment>lock`) holding a process-shared `pthread_rwlock_t`. Readers
//! take the shared side with a bounded wait; writers take the exclusive
//! side with an unbounded wait. The writer that creates a segment removes
//! and re-creates the lock object, which recovers from a peer that crashed
//! while holding it.

use crate::error::{ShmError, ShmResult};
use memmap2::MmapMut;
use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::stat::Mode;
use nix::unistd;
use std::fs::File;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::info;

extern "C" {
    // Not exposed by the `libc` crate for linux-gnu, despite being a
    // standard glibc export; declare it directly.
    fn pthread_rwlock_timedrdlock(
        lock: *mut libc::pthread_rwlock_t,
        abs_timeout: *const libc::timespec,
    ) -> libc::c_int;
}

/// Magic bytes identifying an initialized lock object: `"MRDLOCK\0"`.
const LOCK_MAGIC: u64 = u64::from_ne_bytes(*b"MRDLOCK\0");

/// Size of the lock shared-memory object (one page).
const LOCK_OBJECT_SIZE: usize = 4096;

/// Shared layout of the lock object.
///
/// `ready` is flipped to 1 only after `rwlock` is fully initialized, so an
/// opener racing with the creator never uses a half-built lock.
#[repr(C)]
struct LockShared {
    magic: u64,
    ready: AtomicU32,
    _pad: u32,
    rwlock: libc::pthread_rwlock_t,
}

/// Build the POSIX shm path for a lock object (`"name"` → `"/name"`).
fn shm_path(name: &str) -> String {
    format!("/{name}")
}

/// Named cross-process reader/writer lock.
pub struct ShmRwLock {
    map: MmapMut,
    /// Keeps the shm object's descriptor open for the handle lifetime.
    _file: File,
    name: String,
}

// SAFETY: all synchronization happens through the process-shared
// pthread_rwlock_t inside the mapping; the handle itself holds no state
// that is unsafe to move or share between threads.
unsafe impl Send for ShmRwLock {}
unsafe impl Sync for ShmRwLock {}

impl ShmRwLock {
    /// Remove any pre-existing lock object of this name and create a fresh,
    /// unlocked one. Used by the segment writer.
    pub fn create(name: &str) -> ShmResult<Self> {
        let path = shm_path(name);
        match mman::shm_unlink(path.as_str()) {
            Ok(()) => {}
            Err(nix::errno::Errno::ENOENT) => {
                info!(lock = name, "lock object does not exist, remove skipped");
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
            // Readers map the lock object read-write to take the shared side,
            // so it is world-writable unlike the data segment.
            Mode::from_bits_truncate(0o666),
        )
        .map_err(|e| ShmError::Os {
            segment: name.to_string(),
            source: e,
        })?;

        unistd::ftruncate(&fd, LOCK_OBJECT_SIZE as libc::off_t).map_err(|e| ShmError::Os {
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

        let shared = map.as_mut_ptr() as *mut LockShared;
        // SAFETY: the mapping is at least LOCK_OBJECT_SIZE bytes, freshly
        // zeroed by ftruncate, and exclusively owned until `ready` is set.
        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_rwlockattr_t>::uninit();
            libc::pthread_rwlockattr_init(attr.as_mut_ptr());
            libc::pthread_rwlockattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED);
            let rc = libc::pthread_rwlock_init(&mut (*shared).rwlock, attr.as_ptr());
            libc::pthread_rwlockattr_destroy(attr.as_mut_ptr());
            if rc != 0 {
                return Err(ShmError::Os {
                    segment: name.to_string(),
                    source: nix::errno::Errno::from_raw(rc),
                });
            }
            (*shared).magic = LOCK_MAGIC;
            (*shared).ready.store(1, Ordering::Release);
        }

        Ok(Self {
            map,
            _file: file,
            name: name.to_string(),
        })
    }

    /// Open an existing lock object. Fails if it is absent or uninitialized.
    pub fn open(name: &str) -> ShmResult<Self> {
        let path = shm_path(name);
        let fd = mman::shm_open(path.as_str(), OFlag::O_RDWR, Mode::empty()).map_err(|e| {
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
        if (stat.st_size as usize) < std::mem::size_of::<LockShared>() {
            return Err(ShmError::InvalidSegment {
                segment: name.to_string(),
            });
        }

        let file = File::from(fd);
        let map = unsafe {
            MmapMut::map_mut(&file).map_err(|e| ShmError::Io {
                segment: name.to_string(),
                source: e,
            })?
        };

        let shared = map.as_ptr() as *const LockShared;
        // SAFETY: size validated above; only the magic/ready words are read.
        let initialized = unsafe {
            (*shared).magic == LOCK_MAGIC && (*shared).ready.load(Ordering::Acquire) == 1
        };
        if !initialized {
            return Err(ShmError::InvalidSegment {
                segment: name.to_string(),
            });
        }

        Ok(Self {
            map,
            _file: file,
            name: name.to_string(),
        })
    }

    fn raw(&self) -> *mut libc::pthread_rwlock_t {
        let shared = self.map.as_ptr() as *mut LockShared;
        // SAFETY: mapping outlives the handle; field projection only.
        unsafe { &mut (*shared).rwlock }
    }

    /// Acquire the shared (read) side with a bounded wait.
    ///
    /// On expiry returns [`ShmError::LockTimeout`]; there is no fallback to
    /// a stale read.
    pub fn read_lock(&self, timeout: Duration) -> ShmResult<ShmReadGuard<'_>> {
        let mut deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: plain clock read into a local timespec.
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) };
        deadline.tv_sec += timeout.as_secs() as libc::time_t;
        deadline.tv_nsec += timeout.subsec_nanos() as libc::c_long;
        if deadline.tv_nsec >= 1_000_000_000 {
            deadline.tv_sec += 1;
            deadline.tv_nsec -= 1_000_000_000;
        }

        // SAFETY: raw() points at an initialized process-shared rwlock.
        let rc = unsafe { pthread_rwlock_timedrdlock(self.raw(), &deadline) };
        match rc {
            0 => Ok(ShmReadGuard { lock: self }),
            libc::ETIMEDOUT => Err(ShmError::LockTimeout {
                segment: self.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            other => Err(ShmError::Os {
                segment: self.name.clone(),
                source: nix::errno::Errno::from_raw(other),
            }),
        }
    }

    /// Acquire the exclusive (write) side. The wait is unbounded; writer
    /// starvation is acceptable because writes dominate on a producer.
    pub fn write_lock(&self) -> ShmResult<ShmWriteGuard<'_>> {
        // SAFETY: raw() points at an initialized process-shared rwlock.
        let rc = unsafe { libc::pthread_rwlock_wrlock(self.raw()) };
        if rc != 0 {
            return Err(ShmError::Os {
                segment: self.name.clone(),
                source: nix::errno::Errno::from_raw(rc),
            });
        }
        Ok(ShmWriteGuard { lock: self })
    }

    /// Lock object name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// RAII guard for the shared side; unlocks on drop.
pub struct ShmReadGuard<'a> {
    lock: &'a ShmRwLock,
}

impl Drop for ShmReadGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard holds the shared side of the lock.
        unsafe { libc::pthread_rwlock_unlock(self.lock.raw()) };
    }
}

/// RAII guard for the exclusive side; unlocks on drop.
pub struct ShmWriteGuard<'a> {
    lock: &'a ShmRwLock,
}

impl Drop for ShmWriteGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard holds the exclusive side of the lock.
        unsafe { libc::pthread_rwlock_unlock(self.lock.raw()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("{name}_{}", std::process::id())
    }

    #[test]
    fn create_then_open() {
        let name = unique("lock_create");
        let writer_side = ShmRwLock::create(&name).expect("create lock");
        let reader_side = ShmRwLock::open(&name).expect("open lock");

        {
            let _w = writer_side.write_lock().expect("write lock");
        }
        let _r = reader_side
            .read_lock(Duration::from_secs(1))
            .expect("read lock");
    }

    #[test]
    fn open_missing_fails() {
        let result = ShmRwLock::open("lock_does_not_exist_12345");
        assert!(matches!(result, Err(ShmError::NotFound { .. })));
    }

    #[test]
    fn read_times_out_while_write_held() {
        let name = unique("lock_timeout");
        let writer_side = ShmRwLock::create(&name).expect("create lock");
        let reader_side = ShmRwLock::open(&name).expect("open lock");

        let guard = writer_side.write_lock().expect("write lock");
        let result = reader_side.read_lock(Duration::from_millis(100));
        assert!(matches!(result, Err(ShmError::LockTimeout { .. })));
        drop(guard);

        let _r = reader_side
            .read_lock(Duration::from_secs(1))
            .expect("read lock after release");
    }

    #[test]
    fn shared_side_admits_multiple_readers() {
        let name = unique("lock_shared");
        let lock = ShmRwLock::create(&name).expect("create lock");

        let g1 = lock.read_lock(Duration::from_secs(1)).expect("reader 1");
        let g2 = lock.read_lock(Duration::from_secs(1)).expect("reader 2");
        drop(g1);
        drop(g2);
    }

    #[test]
    fn recreate_recovers_held_lock() {
        let name = unique("lock_recover");
        let first = ShmRwLock::create(&name).expect("create lock");
        // Simulate a crashed peer: take the exclusive side and leak the guard.
        std::mem::forget(first.write_lock().expect("write lock"));

        // A fresh creation replaces the wedged object.
        let second = ShmRwLock::create(&name).expect("re-create lock");
        let _g = second
            .read_lock(Duration::from_secs(1))
            .expect("read lock on fresh object");
    }
}
