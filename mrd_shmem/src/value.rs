//! In-segment record layout and the host-owned export record.

use crate::error::ShmResult;
use crate::segment::Segment;
use static_assertions::const_assert_eq;

/// A string interned in the segment heap.
///
/// `cap` is the allocated payload size; updates that fit are done in place,
/// larger ones reallocate.
#[repr(C)]
pub(crate) struct ShmString {
    pub off: u64,
    pub len: u32,
    pub cap: u32,
}

const_assert_eq!(std::mem::size_of::<ShmString>(), 16);

/// One sensor record as stored inside the segment. All strings are
/// heap-interned; `timestamp_ms` is inline.
#[repr(C)]
pub(crate) struct SensorNode {
    pub key: ShmString,
    pub reading: ShmString,
    pub timestamp_iso: ShmString,
    pub resource_pointer: ShmString,
    pub timestamp_ms: u64,
}

const_assert_eq!(std::mem::size_of::<SensorNode>(), 72);

impl ShmString {
    pub(crate) const EMPTY: ShmString = ShmString {
        off: 0,
        len: 0,
        cap: 0,
    };

    /// Copy `bytes` into the segment heap, reusing the current buffer when
    /// it is large enough.
    pub(crate) fn set(&mut self, seg: &Segment, bytes: &[u8]) -> ShmResult<()> {
        if bytes.len() > self.cap as usize {
            if self.off != 0 {
                seg.dealloc(self.off);
                self.off = 0;
                self.cap = 0;
            }
            let off = seg.alloc(bytes.len())?;
            self.off = off;
            self.cap = bytes.len() as u32;
        }
        if !bytes.is_empty() {
            // SAFETY: `off` addresses a heap block of at least `cap` bytes
            // owned by this string; the caller holds the write lock.
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), seg.ptr_at(self.off), bytes.len());
            }
        }
        self.len = bytes.len() as u32;
        Ok(())
    }

    /// Read the interned bytes back into a host-owned `String`. Interior
    /// bytes are produced by this crate and are always valid UTF-8.
    pub(crate) fn read(&self, seg: &Segment) -> String {
        if self.len == 0 {
            return String::new();
        }
        // SAFETY: `off`/`len` describe an interned buffer; the caller holds
        // at least the read lock.
        let bytes = unsafe {
            std::slice::from_raw_parts(seg.ptr_at(self.off) as *const u8, self.len as usize)
        };
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Compare the interned bytes against `other` without copying.
    pub(crate) fn cmp_bytes(&self, seg: &Segment, other: &[u8]) -> std::cmp::Ordering {
        if self.len == 0 {
            return 0usize.cmp(&other.len());
        }
        // SAFETY: as in `read`.
        let bytes = unsafe {
            std::slice::from_raw_parts(seg.ptr_at(self.off) as *const u8, self.len as usize)
        };
        bytes.cmp(other)
    }

    /// Release the interned buffer back to the segment heap.
    pub(crate) fn free(&mut self, seg: &Segment) {
        if self.off != 0 {
            seg.dealloc(self.off);
            self.off = 0;
            self.len = 0;
            self.cap = 0;
        }
    }
}

/// Host-owned form of a sensor record, used for boundary-crossing returns
/// to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorValue {
    /// Canonical reading string (already translated/rendered).
    pub reading: String,
    /// Public resource pointer where the reading appears.
    pub resource_pointer: String,
    /// Producer-supplied monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Rendered wall-clock timestamp, ISO 8601 extended.
    pub timestamp_iso: String,
}

impl SensorValue {
    /// Convenience constructor matching the insert argument order.
    pub fn new(
        reading: impl Into<String>,
        resource_pointer: impl Into<String>,
        timestamp_ms: u64,
        timestamp_iso: impl Into<String>,
    ) -> Self {
        Self {
            reading: reading.into(),
            resource_pointer: resource_pointer.into(),
            timestamp_ms,
            timestamp_iso: timestamp_iso.into(),
        }
    }
}
