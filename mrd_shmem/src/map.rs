//! The shared-memory sensor map.
//!
//! An ordered mapping from an interned string key to a [`SensorNode`],
//! stored in a [`Segment`] and registered in its directory under the
//! well-known name `<segment>map`. The ordering exists so consumers iterate
//! deterministically; it carries no other meaning.
//!
//! Internally the map is a sorted array of node offsets: binary search on
//! lookup, `memmove` on insert/erase. Capacity starts at the caller's
//! element hint and doubles when exhausted.
//!
//! Locking discipline: every mutation holds the exclusive side of the
//! segment lock; every read holds the shared side with a bounded 1 s wait.
//! Writer-only operations on a read-only handle fail with
//! [`ShmError::PermissionDenied`] — that is a caller bug, not a runtime
//! condition.

use crate::error::{ShmError, ShmResult};
use crate::segment::{AccessMode, Segment};
use crate::value::{SensorNode, SensorValue, ShmString};
use static_assertions::const_assert_eq;
use std::cmp::Ordering;
use std::time::Duration;

/// Bounded wait for the shared (read) side of the segment lock.
pub const READ_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Suffix appended to a segment name to derive the map's directory name.
pub const MAP_SUFFIX: &str = "map";

/// Minimum entry-array capacity.
const MIN_CAPACITY: u64 = 16;

/// Map root object registered in the segment directory.
#[repr(C)]
struct MapRoot {
    /// Heap offset of the sorted node-offset array.
    entries_off: u64,
    len: u64,
    cap: u64,
}

const_assert_eq!(std::mem::size_of::<MapRoot>(), 24);

/// Handle to a sensor map inside a named segment.
pub struct SensorMap {
    seg: Segment,
    root_off: u64,
}

impl SensorMap {
    /// Create the segment (remove-then-create) and construct a fresh map at
    /// its well-known name, sized for roughly `element_capacity_hint`
    /// entries. The map is cleared even if a prior root is found, so the
    /// producer always starts from an empty namespace.
    pub fn with_create(name: &str, bytes: usize, element_capacity_hint: usize) -> ShmResult<Self> {
        let seg = Segment::create(name, bytes)?;
        let map_name = format!("{name}{MAP_SUFFIX}");

        let root_off = match seg.dir_find(&map_name) {
            Some(off) => off,
            None => {
                let cap = (element_capacity_hint as u64).max(MIN_CAPACITY);
                let entries_off = seg.alloc((cap * 8) as usize)?;
                let root_off = seg.alloc(std::mem::size_of::<MapRoot>())?;
                // SAFETY: freshly allocated, exclusively owned until the
                // directory entry publishes it.
                unsafe {
                    let root = seg.ptr_at(root_off) as *mut MapRoot;
                    (*root).entries_off = entries_off;
                    (*root).len = 0;
                    (*root).cap = cap;
                }
                seg.dir_insert(&map_name, root_off)?;
                root_off
            }
        };

        let map = Self { seg, root_off };
        map.clear()?;
        Ok(map)
    }

    /// Open an existing segment read-only and locate the map. A missing
    /// map object is a [`ShmError::BadMap`].
    pub fn readonly(name: &str) -> ShmResult<Self> {
        let seg = Segment::open_readonly(name)?;
        let map_name = format!("{name}{MAP_SUFFIX}");
        let root_off = seg.dir_find(&map_name).ok_or_else(|| ShmError::BadMap {
            segment: name.to_string(),
        })?;
        Ok(Self { seg, root_off })
    }

    /// Segment name this map lives in.
    pub fn name(&self) -> &str {
        self.seg.name()
    }

    /// Free heap space left in the segment, for observability.
    pub fn free_bytes(&self) -> usize {
        self.seg.free_bytes()
    }

    /// Number of entries. Best-effort scalar read, no lock taken.
    pub fn size(&self) -> usize {
        // SAFETY: the root is immovable for the segment lifetime; `len` is
        // a single word and staleness is acceptable here.
        unsafe { (*self.root()).len as usize }
    }

    fn root(&self) -> *mut MapRoot {
        // SAFETY: root_off was produced by with_create/readonly.
        unsafe { self.seg.ptr_at(self.root_off) as *mut MapRoot }
    }

    /// # Safety
    /// Caller must hold the segment lock (either side).
    unsafe fn entry_slot(&self, index: usize) -> *mut u64 {
        let root = self.root();
        (self.seg.ptr_at((*root).entries_off) as *mut u64).add(index)
    }

    /// # Safety
    /// `off` must be a live node offset from the entry array.
    unsafe fn node(&self, off: u64) -> *mut SensorNode {
        self.seg.ptr_at(off) as *mut SensorNode
    }

    fn check_writable(&self) -> ShmResult<()> {
        if self.seg.mode() != AccessMode::ReadWrite {
            return Err(ShmError::PermissionDenied {
                segment: self.seg.name().to_string(),
            });
        }
        Ok(())
    }

    /// Binary search for `key`. Ok(index) on a hit, Err(insertion point)
    /// otherwise.
    ///
    /// # Safety
    /// Caller must hold the segment lock.
    unsafe fn find_index(&self, key: &[u8]) -> Result<usize, usize> {
        let root = self.root();
        let mut lo = 0usize;
        let mut hi = (*root).len as usize;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let node = self.node(*self.entry_slot(mid));
            match (*node).key.cmp_bytes(&self.seg, key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// # Safety
    /// Caller must hold the exclusive lock.
    unsafe fn grow_if_full(&self) -> ShmResult<()> {
        let root = self.root();
        if (*root).len < (*root).cap {
            return Ok(());
        }
        let new_cap = ((*root).cap * 2).max(MIN_CAPACITY);
        let new_off = self.seg.alloc((new_cap * 8) as usize)?;
        std::ptr::copy_nonoverlapping(
            self.seg.ptr_at((*root).entries_off) as *const u64,
            self.seg.ptr_at(new_off) as *mut u64,
            (*root).len as usize,
        );
        self.seg.dealloc((*root).entries_off);
        (*root).entries_off = new_off;
        (*root).cap = new_cap;
        Ok(())
    }

    /// Insert `value` under `key`, replacing the record if the key exists.
    pub fn insert(&self, key: &str, value: &SensorValue) -> ShmResult<()> {
        self.check_writable()?;
        let _guard = self.seg.lock().write_lock()?;
        // SAFETY: exclusive lock held for the whole mutation.
        unsafe {
            match self.find_index(key.as_bytes()) {
                Ok(index) => {
                    let node = self.node(*self.entry_slot(index));
                    (*node).reading.set(&self.seg, value.reading.as_bytes())?;
                    (*node)
                        .timestamp_iso
                        .set(&self.seg, value.timestamp_iso.as_bytes())?;
                    (*node)
                        .resource_pointer
                        .set(&self.seg, value.resource_pointer.as_bytes())?;
                    (*node).timestamp_ms = value.timestamp_ms;
                }
                Err(index) => {
                    self.grow_if_full()?;
                    let node_off = self.seg.alloc(std::mem::size_of::<SensorNode>())?;
                    let node = self.node(node_off);
                    (*node).key = ShmString::EMPTY;
                    (*node).reading = ShmString::EMPTY;
                    (*node).timestamp_iso = ShmString::EMPTY;
                    (*node).resource_pointer = ShmString::EMPTY;
                    (*node).key.set(&self.seg, key.as_bytes())?;
                    (*node).reading.set(&self.seg, value.reading.as_bytes())?;
                    (*node)
                        .timestamp_iso
                        .set(&self.seg, value.timestamp_iso.as_bytes())?;
                    (*node)
                        .resource_pointer
                        .set(&self.seg, value.resource_pointer.as_bytes())?;
                    (*node).timestamp_ms = value.timestamp_ms;

                    let root = self.root();
                    let len = (*root).len as usize;
                    if index < len {
                        std::ptr::copy(
                            self.entry_slot(index),
                            self.entry_slot(index + 1),
                            len - index,
                        );
                    }
                    *self.entry_slot(index) = node_off;
                    (*root).len += 1;
                }
            }
        }
        Ok(())
    }

    /// Replace only the reading. Returns false when `key` is absent.
    pub fn update_value(&self, key: &str, reading: &str) -> ShmResult<bool> {
        self.check_writable()?;
        let _guard = self.seg.lock().write_lock()?;
        // SAFETY: exclusive lock held.
        unsafe {
            match self.find_index(key.as_bytes()) {
                Ok(index) => {
                    let node = self.node(*self.entry_slot(index));
                    (*node).reading.set(&self.seg, reading.as_bytes())?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        }
    }

    /// Replace both timestamp fields. Returns false when `key` is absent.
    pub fn update_timestamp(&self, key: &str, ts_ms: u64, ts_iso: &str) -> ShmResult<bool> {
        self.check_writable()?;
        let _guard = self.seg.lock().write_lock()?;
        // SAFETY: exclusive lock held.
        unsafe {
            match self.find_index(key.as_bytes()) {
                Ok(index) => {
                    let node = self.node(*self.entry_slot(index));
                    (*node).timestamp_ms = ts_ms;
                    (*node).timestamp_iso.set(&self.seg, ts_iso.as_bytes())?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        }
    }

    /// Combined reading + timestamp update under one lock acquisition.
    /// Returns false when `key` is absent.
    pub fn update_value_and_timestamp(
        &self,
        key: &str,
        reading: &str,
        ts_ms: u64,
        ts_iso: &str,
    ) -> ShmResult<bool> {
        self.check_writable()?;
        let _guard = self.seg.lock().write_lock()?;
        // SAFETY: exclusive lock held.
        unsafe {
            match self.find_index(key.as_bytes()) {
                Ok(index) => {
                    let node = self.node(*self.entry_slot(index));
                    (*node).reading.set(&self.seg, reading.as_bytes())?;
                    (*node).timestamp_ms = ts_ms;
                    (*node).timestamp_iso.set(&self.seg, ts_iso.as_bytes())?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        }
    }

    /// Remove `key` if present; absence is tolerated.
    pub fn erase(&self, key: &str) -> ShmResult<()> {
        self.check_writable()?;
        let _guard = self.seg.lock().write_lock()?;
        // SAFETY: exclusive lock held.
        unsafe {
            if let Ok(index) = self.find_index(key.as_bytes()) {
                self.release_node(*self.entry_slot(index));
                let root = self.root();
                let len = (*root).len as usize;
                if index + 1 < len {
                    std::ptr::copy(
                        self.entry_slot(index + 1),
                        self.entry_slot(index),
                        len - index - 1,
                    );
                }
                (*root).len -= 1;
            }
        }
        Ok(())
    }

    /// Remove every entry, returning their storage to the heap.
    pub fn clear(&self) -> ShmResult<()> {
        self.check_writable()?;
        let _guard = self.seg.lock().write_lock()?;
        // SAFETY: exclusive lock held.
        unsafe {
            let root = self.root();
            let len = (*root).len as usize;
            for index in 0..len {
                self.release_node(*self.entry_slot(index));
            }
            (*root).len = 0;
        }
        Ok(())
    }

    /// # Safety
    /// Caller must hold the exclusive lock; `off` must be a live node.
    unsafe fn release_node(&self, off: u64) {
        let node = self.node(off);
        (*node).key.free(&self.seg);
        (*node).reading.free(&self.seg);
        (*node).timestamp_iso.free(&self.seg);
        (*node).resource_pointer.free(&self.seg);
        self.seg.dealloc(off);
    }

    /// # Safety
    /// Caller must hold the segment lock; `off` must be a live node.
    unsafe fn export(&self, off: u64) -> SensorValue {
        let node = self.node(off);
        SensorValue {
            reading: (*node).reading.read(&self.seg),
            resource_pointer: (*node).resource_pointer.read(&self.seg),
            timestamp_ms: (*node).timestamp_ms,
            timestamp_iso: (*node).timestamp_iso.read(&self.seg),
        }
    }

    /// Fetch one record under the shared lock.
    pub fn get(&self, key: &str) -> ShmResult<Option<SensorValue>> {
        let _guard = self.seg.lock().read_lock(READ_LOCK_TIMEOUT)?;
        // SAFETY: shared lock held.
        unsafe {
            Ok(match self.find_index(key.as_bytes()) {
                Ok(index) => Some(self.export(*self.entry_slot(index))),
                Err(_) => None,
            })
        }
    }

    /// Snapshot every record, in key order, under the shared lock.
    pub fn get_all(&self) -> ShmResult<Vec<SensorValue>> {
        let _guard = self.seg.lock().read_lock(READ_LOCK_TIMEOUT)?;
        // SAFETY: shared lock held.
        unsafe {
            let len = (*self.root()).len as usize;
            let mut values = Vec::with_capacity(len);
            for index in 0..len {
                values.push(self.export(*self.entry_slot(index)));
            }
            Ok(values)
        }
    }

    /// Snapshot every (key, record) pair, in key order. Raw access for
    /// tooling and the consumer raw API.
    pub fn get_all_pairs(&self) -> ShmResult<Vec<(String, SensorValue)>> {
        let _guard = self.seg.lock().read_lock(READ_LOCK_TIMEOUT)?;
        // SAFETY: shared lock held.
        unsafe {
            let len = (*self.root()).len as usize;
            let mut pairs = Vec::with_capacity(len);
            for index in 0..len {
                let off = *self.entry_slot(index);
                let key = (*self.node(off)).key.read(&self.seg);
                pairs.push((key, self.export(off)));
            }
            Ok(pairs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("{name}_{}", std::process::id())
    }

    fn sample(i: usize) -> (String, SensorValue) {
        (
            format!("HGX_Chassis_0_My_Sensor_{i}"),
            SensorValue::new(
                i.to_string(),
                format!("/redfish/v1/HGX_Chassis_0/Sensors/Sensor_{i}"),
                0,
                "1970-01-01T00:00:00.000+00:00",
            ),
        )
    }

    #[test]
    fn insert_and_size() {
        let map = SensorMap::with_create(&unique("map_create"), 1024 * 1000, 16).unwrap();
        for i in 0..5 {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        assert_eq!(map.size(), 5);
    }

    #[test]
    fn clear_empties_the_map() {
        let map = SensorMap::with_create(&unique("map_clear"), 1024 * 1000, 16).unwrap();
        for i in 0..5 {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        assert_ne!(map.size(), 0);
        map.clear().unwrap();
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn get_roundtrip() {
        let map = SensorMap::with_create(&unique("map_get"), 1024 * 1000, 16).unwrap();
        let value = SensorValue::new(
            "100",
            "/redfish/v1/HGX_Chassis_0/Sensors/Sensor_1",
            1_699_255_438,
            "2023-11-06T06:43:58.000+00:00",
        );
        map.insert("HGX_Chassis_0_My_Sensor_1", &value).unwrap();

        let read = map.get("HGX_Chassis_0_My_Sensor_1").unwrap().unwrap();
        assert_eq!(read, value);
        assert!(map.get("HGX_Chassis_0_Absent").unwrap().is_none());
    }

    #[test]
    fn reinsert_replaces_value() {
        let map = SensorMap::with_create(&unique("map_replace"), 1024 * 1000, 16).unwrap();
        let (key, first) = sample(1);
        map.insert(&key, &first).unwrap();

        let second = SensorValue::new("101", first.resource_pointer.clone(), 7, "later");
        map.insert(&key, &second).unwrap();

        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&key).unwrap().unwrap(), second);
    }

    #[test]
    fn get_all_is_key_ordered() {
        let map = SensorMap::with_create(&unique("map_all"), 1024 * 1000, 16).unwrap();
        for i in [3usize, 0, 4, 1, 2] {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        let all = map.get_all().unwrap();
        assert_eq!(all.len(), 5);
        let readings: Vec<&str> = all.iter().map(|v| v.reading.as_str()).collect();
        assert_eq!(readings, ["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn erase_removes_key() {
        let map = SensorMap::with_create(&unique("map_erase"), 1024 * 1000, 16).unwrap();
        for i in 0..10 {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        map.erase("HGX_Chassis_0_My_Sensor_1").unwrap();
        assert!(map.get("HGX_Chassis_0_My_Sensor_1").unwrap().is_none());
        assert_eq!(map.size(), 9);
        // Erasing a missing key is tolerated.
        map.erase("HGX_Chassis_0_My_Sensor_1").unwrap();
        assert_eq!(map.size(), 9);
    }

    #[test]
    fn update_value_only_touches_reading() {
        let map = SensorMap::with_create(&unique("map_updval"), 1024 * 1000, 16).unwrap();
        let (key, value) = sample(1);
        map.insert(&key, &value).unwrap();

        assert!(map.update_value(&key, "101").unwrap());
        let read = map.get(&key).unwrap().unwrap();
        assert_eq!(read.reading, "101");
        assert_eq!(read.resource_pointer, value.resource_pointer);
        assert_eq!(read.timestamp_ms, value.timestamp_ms);
        assert_eq!(read.timestamp_iso, value.timestamp_iso);

        assert!(!map.update_value("missing", "101").unwrap());
    }

    #[test]
    fn update_timestamp_only_touches_timestamps() {
        let map = SensorMap::with_create(&unique("map_updts"), 1024 * 1000, 16).unwrap();
        let (key, value) = sample(1);
        map.insert(&key, &value).unwrap();

        assert!(map
            .update_timestamp(&key, 1_699_255_439, "2023-11-06T06:43:59.000+00:00")
            .unwrap());
        let read = map.get(&key).unwrap().unwrap();
        assert_eq!(read.timestamp_ms, 1_699_255_439);
        assert_eq!(read.timestamp_iso, "2023-11-06T06:43:59.000+00:00");
        assert_eq!(read.reading, value.reading);
    }

    #[test]
    fn update_value_and_timestamp_is_combined() {
        let map = SensorMap::with_create(&unique("map_updboth"), 1024 * 1000, 16).unwrap();
        let (key, value) = sample(1);
        map.insert(&key, &value).unwrap();

        assert!(map
            .update_value_and_timestamp(&key, "42.5", 99, "iso")
            .unwrap());
        let read = map.get(&key).unwrap().unwrap();
        assert_eq!(read.reading, "42.5");
        assert_eq!(read.timestamp_ms, 99);
        assert_eq!(read.timestamp_iso, "iso");
        assert_eq!(read.resource_pointer, value.resource_pointer);

        assert!(!map
            .update_value_and_timestamp("missing", "1", 0, "iso")
            .unwrap());
    }

    #[test]
    fn longer_reading_reallocates_in_place() {
        let map = SensorMap::with_create(&unique("map_grow_str"), 1024 * 1000, 16).unwrap();
        let (key, value) = sample(1);
        map.insert(&key, &value).unwrap();

        let long = "x".repeat(300);
        assert!(map.update_value(&key, &long).unwrap());
        assert_eq!(map.get(&key).unwrap().unwrap().reading, long);
    }

    #[test]
    fn capacity_growth_beyond_hint() {
        let map = SensorMap::with_create(&unique("map_grow_cap"), 1024 * 1000, 4).unwrap();
        for i in 0..100 {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        assert_eq!(map.size(), 100);
        assert_eq!(map.get_all().unwrap().len(), 100);
    }

    #[test]
    fn readonly_handle_rejects_writes() {
        let name = unique("map_ro");
        let writer = SensorMap::with_create(&name, 1024 * 1000, 16).unwrap();
        let (key, value) = sample(1);
        writer.insert(&key, &value).unwrap();

        let reader = SensorMap::readonly(&name).unwrap();
        assert_eq!(reader.get(&key).unwrap().unwrap(), value);
        assert!(matches!(
            reader.insert(&key, &value),
            Err(ShmError::PermissionDenied { .. })
        ));
        assert!(matches!(
            reader.update_value(&key, "1"),
            Err(ShmError::PermissionDenied { .. })
        ));
        assert!(matches!(
            reader.erase(&key),
            Err(ShmError::PermissionDenied { .. })
        ));
        assert!(matches!(
            reader.clear(),
            Err(ShmError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn readonly_missing_segment_or_map() {
        assert!(matches!(
            SensorMap::readonly("map_never_created_9999"),
            Err(ShmError::NotFound { .. })
        ));
    }

    #[test]
    fn get_all_pairs_returns_keys() {
        let map = SensorMap::with_create(&unique("map_pairs"), 1024 * 1000, 16).unwrap();
        for i in 0..3 {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        let pairs = map.get_all_pairs().unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].0, "HGX_Chassis_0_My_Sensor_0");
        assert_eq!(pairs[0].1.reading, "0");
    }

    #[test]
    fn free_bytes_shrinks_and_recovers() {
        let map = SensorMap::with_create(&unique("map_free"), 1024 * 1000, 16).unwrap();
        let empty = map.free_bytes();
        for i in 0..50 {
            let (key, value) = sample(i);
            map.insert(&key, &value).unwrap();
        }
        assert!(map.free_bytes() < empty);
        map.clear().unwrap();
        assert!(map.free_bytes() > empty / 2);
    }
}
