//! Process-local directory of owned sensor maps.
//!
//! The store is the boundary the aggregator talks through: every operation
//! returns a plain `bool` and logs instead of propagating, so the telemetry
//! hot path never unwinds across it.

use crate::map::SensorMap;
use crate::value::SensorValue;
use std::collections::HashMap;
use tracing::error;

/// Directory of owned [`SensorMap`]s keyed by segment name.
#[derive(Default)]
pub struct SensorStore {
    maps: HashMap<String, SensorMap>,
}

impl SensorStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a map for `name` is already open in this process.
    pub fn has(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Create the segment and map for `name` unless already present. The
    /// cache stays consistent on failure.
    pub fn create(&mut self, name: &str, bytes: usize, element_capacity_hint: usize) -> bool {
        if self.maps.contains_key(name) {
            return true;
        }
        match SensorMap::with_create(name, bytes, element_capacity_hint) {
            Ok(map) => {
                self.maps.insert(name.to_string(), map);
                true
            }
            Err(e) => {
                error!(segment = name, error = %e, "sensor map creation failed");
                false
            }
        }
    }

    /// Insert `value` under `key` in the named map.
    pub fn insert(&self, name: &str, key: &str, value: &SensorValue) -> bool {
        let Some(map) = self.maps.get(name) else {
            error!(segment = name, "insert into unknown namespace");
            return false;
        };
        match map.insert(key, value) {
            Ok(()) => true,
            Err(e) => {
                error!(segment = name, key, error = %e, "sensor map insert failed");
                false
            }
        }
    }

    /// Replace the reading of `key`.
    pub fn update_value(&self, name: &str, key: &str, reading: &str) -> bool {
        let Some(map) = self.maps.get(name) else {
            error!(segment = name, "update_value on unknown namespace");
            return false;
        };
        match map.update_value(key, reading) {
            Ok(true) => true,
            Ok(false) => {
                error!(segment = name, key, "update_value on unknown key");
                false
            }
            Err(e) => {
                error!(segment = name, key, error = %e, "sensor map update_value failed");
                false
            }
        }
    }

    /// Replace the timestamp fields of `key`.
    pub fn update_timestamp(&self, name: &str, key: &str, ts_ms: u64, ts_iso: &str) -> bool {
        let Some(map) = self.maps.get(name) else {
            error!(segment = name, "update_timestamp on unknown namespace");
            return false;
        };
        match map.update_timestamp(key, ts_ms, ts_iso) {
            Ok(true) => true,
            Ok(false) => {
                error!(segment = name, key, "update_timestamp on unknown key");
                false
            }
            Err(e) => {
                error!(segment = name, key, error = %e, "sensor map update_timestamp failed");
                false
            }
        }
    }

    /// Combined reading + timestamp replacement for `key`.
    pub fn update_value_and_timestamp(
        &self,
        name: &str,
        key: &str,
        reading: &str,
        ts_ms: u64,
        ts_iso: &str,
    ) -> bool {
        let Some(map) = self.maps.get(name) else {
            error!(segment = name, "update_value_and_timestamp on unknown namespace");
            return false;
        };
        match map.update_value_and_timestamp(key, reading, ts_ms, ts_iso) {
            Ok(true) => true,
            Ok(false) => {
                error!(segment = name, key, "update_value_and_timestamp on unknown key");
                false
            }
            Err(e) => {
                error!(
                    segment = name,
                    key,
                    error = %e,
                    "sensor map update_value_and_timestamp failed"
                );
                false
            }
        }
    }

    /// Remove `key` from the named map; a missing key is tolerated.
    pub fn erase(&self, name: &str, key: &str) -> bool {
        let Some(map) = self.maps.get(name) else {
            error!(segment = name, "erase on unknown namespace");
            return false;
        };
        match map.erase(key) {
            Ok(()) => true,
            Err(e) => {
                error!(segment = name, key, error = %e, "sensor map erase failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("{name}_{}", std::process::id())
    }

    fn value() -> SensorValue {
        SensorValue::new("19.062500", "/redfish/v1/Chassis/X/Sensors/Y", 5, "iso")
    }

    #[test]
    fn create_is_idempotent() {
        let name = unique("store_create");
        let mut store = SensorStore::new();
        assert!(!store.has(&name));
        assert!(store.create(&name, 1024 * 1000, 16));
        assert!(store.has(&name));
        assert!(store.create(&name, 1024 * 1000, 16));
    }

    #[test]
    fn operations_on_unknown_namespace_fail() {
        let store = SensorStore::new();
        assert!(!store.insert("nope", "k", &value()));
        assert!(!store.update_value("nope", "k", "1"));
        assert!(!store.update_timestamp("nope", "k", 0, "iso"));
        assert!(!store.update_value_and_timestamp("nope", "k", "1", 0, "iso"));
        assert!(!store.erase("nope", "k"));
    }

    #[test]
    fn insert_update_erase_flow() {
        let name = unique("store_flow");
        let mut store = SensorStore::new();
        assert!(store.create(&name, 1024 * 1000, 16));

        assert!(store.insert(&name, "k", &value()));
        assert!(store.update_value(&name, "k", "29.062500"));
        assert!(store.update_timestamp(&name, "k", 6, "iso2"));
        assert!(store.update_value_and_timestamp(&name, "k", "30.0", 7, "iso3"));
        assert!(store.erase(&name, "k"));

        // Updates on the erased key report failure without raising.
        assert!(!store.update_value(&name, "k", "1"));
        // Erase of a missing key is tolerated.
        assert!(store.erase(&name, "k"));
    }
}
