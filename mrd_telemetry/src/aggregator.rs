//! Per-producer sensor aggregation state machine.
//!
//! Classifies incoming bus property updates into shared-memory namespaces,
//! expands payloads into one or many map entries, performs differential
//! list updates and handles no-reading transitions.
//!
//! Lock order: an intra-process cache lock is taken, the in-memory work is
//! done, the lock released, and only then does the code talk to the store.
//! Cache locks and the store lock are never held together.

use crate::config::{NamespaceConfig, ShmConfig};
use crate::consts::{
    segment_name, DEFAULT_ELEMENT_CAPACITY, DEFAULT_SEGMENT_BYTES, SENSORS_PATH_PREFIX,
};
use crate::log_limit::log_error_limited;
use crate::payload::PayloadValue;
use crate::time::date_time_ms;
use crate::translate::{basename, expand, reading_for, Expanded};
use mrd_shmem::{SensorStore, SensorValue};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Cached classification of one sensor key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Matched sensor namespace.
    pub namespace: String,
    /// Device name feeding URI construction.
    pub device_name: String,
    /// Sub-device name feeding URI construction.
    pub sub_device_name: String,
    /// Current list cardinality; 0 for scalar entries.
    pub array_cardinality: usize,
}

/// Candidate produced by the path matcher: namespace, device name,
/// sub-device name and the index of the matching pattern.
type Candidate = (String, String, String, usize);

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Producer-supplied monotonic milliseconds approximated to wall time:
/// `(system_now - steady_now) + ts`. The offset is recomputed per call, so
/// renderings do not drift between calls.
fn wall_clock_ms(ts_ms: u64) -> u64 {
    fn clock_ms(clock: libc::clockid_t) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: plain clock read into a local timespec.
        unsafe { libc::clock_gettime(clock, &mut ts) };
        ts.tv_sec as u64 * 1_000 + ts.tv_nsec as u64 / 1_000_000
    }
    clock_ms(libc::CLOCK_REALTIME)
        .wrapping_sub(clock_ms(libc::CLOCK_MONOTONIC))
        .wrapping_add(ts_ms)
}

/// Per-producer aggregator over the shared-memory sensor store.
pub struct SensorAggregator {
    producer_name: String,
    ns_config: NamespaceConfig,
    store: Mutex<SensorStore>,
    classifications: Mutex<HashMap<String, Classification>>,
    not_applicable: Mutex<HashSet<String>>,
}

impl SensorAggregator {
    /// Aggregator for `producer_name` using the parsed namespace table.
    pub fn new(producer_name: String, ns_config: NamespaceConfig) -> Self {
        Self {
            producer_name,
            ns_config,
            store: Mutex::new(SensorStore::new()),
            classifications: Mutex::new(HashMap::new()),
            not_applicable: Mutex::new(HashSet::new()),
        }
    }

    /// Sensor key of one (device path, interface, property) triple.
    fn sensor_key(device_path: &str, interface: &str, property: &str) -> String {
        format!("{device_path}/{interface}.{property}")
    }

    /// Pre-create every namespace this producer is authorized for, at the
    /// configured size. One failure stops the loop.
    pub fn create_namespaces(&self, config: &ShmConfig) -> bool {
        for (namespace, producers) in config.producers() {
            if !producers.iter().any(|name| name == &self.producer_name) {
                continue;
            }
            let bytes = match config.segment_bytes(&namespace, &self.producer_name) {
                Ok(bytes) => bytes as usize,
                Err(e) => {
                    log_error_limited(format!(
                        "segment size lookup failed for namespace {namespace}: {e}"
                    ));
                    return false;
                }
            };
            let segment = segment_name(&self.producer_name, &namespace);
            if !lock(&self.store).create(&segment, bytes, DEFAULT_ELEMENT_CAPACITY) {
                return false;
            }
        }
        true
    }

    /// Match count of one object-path keyword pattern against the device
    /// path tokens: every pattern token must be found (substring match) at
    /// or after the previous match, preserving order. Any miss zeroes the
    /// count.
    fn match_count(obj_path_keyword: &str, device_tokens: &[&str]) -> usize {
        let mut count = 0usize;
        let mut start = 0usize;
        for (pattern_index, pattern_token) in obj_path_keyword
            .trim_matches('/')
            .split('/')
            .filter(|token| !token.is_empty())
            .enumerate()
        {
            for (device_index, device_token) in
                device_tokens.iter().enumerate().skip(start)
            {
                if device_token.contains(pattern_token) {
                    start = device_index;
                    count += 1;
                    break;
                }
            }
            if count != pattern_index + 1 {
                return 0;
            }
        }
        count
    }

    /// Compare the device path against every configured pattern and return
    /// the candidates tied at the maximum match count, with device and
    /// sub-device names derived at the moment the maximum was raised.
    fn parse_device_path(&self, device_path: &str) -> Vec<Candidate> {
        let trimmed = device_path.trim_matches('/');
        let device_tokens: Vec<&str> =
            trimmed.split('/').filter(|token| !token.is_empty()).collect();

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut max_count = 0usize;
        let mut device_name = String::new();
        let mut sub_device_name = String::new();

        for (namespace, values) in &self.ns_config {
            for (pattern_index, (pattern, _props)) in values.iter().enumerate() {
                let count = Self::match_count(pattern, &device_tokens);
                if count == 0 {
                    continue;
                }
                if count > max_count {
                    max_count = count;
                    if max_count == 1 {
                        device_name = basename(trimmed).to_string();
                        sub_device_name.clear();
                    } else if trimmed.starts_with(SENSORS_PATH_PREFIX) {
                        sub_device_name = basename(trimmed).to_string();
                        device_name.clear();
                    } else {
                        device_name = device_tokens
                            .len()
                            .checked_sub(3)
                            .and_then(|index| device_tokens.get(index))
                            .unwrap_or(&"")
                            .to_string();
                        sub_device_name = basename(trimmed).to_string();
                    }
                    candidates.clear();
                    candidates.push((
                        namespace.clone(),
                        device_name.clone(),
                        sub_device_name.clone(),
                        pattern_index,
                    ));
                } else if count == max_count {
                    candidates.push((
                        namespace.clone(),
                        device_name.clone(),
                        sub_device_name.clone(),
                        pattern_index,
                    ));
                }
            }
        }
        candidates
    }

    fn mark_not_applicable(&self, sensor_key: &str) {
        lock(&self.not_applicable).insert(sensor_key.to_string());
    }

    /// Cached classification of `sensor_key`, if any. Diagnostic support.
    pub fn classification(&self, sensor_key: &str) -> Option<Classification> {
        lock(&self.classifications).get(sensor_key).cloned()
    }

    /// Whether `sensor_key` is cached as not applicable. Diagnostic
    /// support.
    pub fn is_not_applicable(&self, sensor_key: &str) -> bool {
        lock(&self.not_applicable).contains(sensor_key)
    }

    /// Materialize a newly classified key: expand the payload, cache the
    /// classification and insert every produced record.
    #[allow(clippy::too_many_arguments)]
    fn insert_shmem_object(
        &self,
        namespace: &str,
        device_name: &str,
        sub_device_name: &str,
        sensor_key: &str,
        device_path: &str,
        property: &str,
        interface: &str,
        value: &PayloadValue,
        ts_ms: u64,
    ) -> bool {
        let ts_iso = date_time_ms(wall_clock_ms(ts_ms));
        let segment = segment_name(&self.producer_name, namespace);

        {
            let mut store = lock(&self.store);
            if !store.has(&segment)
                && !store.create(&segment, DEFAULT_SEGMENT_BYTES, DEFAULT_ELEMENT_CAPACITY)
            {
                return false;
            }
        }

        let expanded = expand(
            namespace,
            device_name,
            sub_device_name,
            device_path,
            property,
            interface,
            value,
        );
        if expanded.entries.is_empty() {
            if expanded.is_list {
                // A transiently empty list publishes nothing; leave the key
                // unclassified so a later non-empty payload gets through.
                return true;
            }
            // Empty resource pointer: this combination is not published.
            self.mark_not_applicable(sensor_key);
            return false;
        }

        {
            let mut classifications = lock(&self.classifications);
            classifications.insert(
                sensor_key.to_string(),
                Classification {
                    namespace: namespace.to_string(),
                    device_name: device_name.to_string(),
                    sub_device_name: sub_device_name.to_string(),
                    array_cardinality: if expanded.is_list {
                        expanded.entries.len()
                    } else {
                        0
                    },
                },
            );
        }

        let mut status = true;
        let store = lock(&self.store);
        for (shm_key, entry) in &expanded.entries {
            if shm_key.is_empty() {
                continue;
            }
            let record = SensorValue::new(
                entry.reading.clone(),
                entry.resource_pointer.clone(),
                ts_ms,
                ts_iso.clone(),
            );
            if !store.insert(&segment, shm_key, &record) {
                status = false;
            }
        }
        status
    }

    /// Walk the matching candidates and insert the first one whose
    /// property list contains `property`; non-matching candidates park the
    /// key in the not-applicable set.
    #[allow(clippy::too_many_arguments)]
    fn insert_object(
        &self,
        candidates: Vec<Candidate>,
        device_path: &str,
        interface: &str,
        property: &str,
        sensor_key: &str,
        value: &PayloadValue,
        ts_ms: u64,
        associated_entity: &str,
    ) -> bool {
        for (namespace, mut device_name, sub_device_name, pattern_index) in candidates {
            if namespace.is_empty() {
                log_error_limited(format!(
                    "no matching namespace found for device path {device_path}"
                ));
                self.mark_not_applicable(sensor_key);
                return false;
            }
            if device_name.is_empty() {
                if associated_entity.is_empty() {
                    log_error_limited(format!(
                        "parent path should not be empty for sensor resource: {device_path}"
                    ));
                    self.mark_not_applicable(sensor_key);
                    return false;
                }
                device_name = basename(associated_entity).to_string();
            }
            let in_property_list = self
                .ns_config
                .get(&namespace)
                .and_then(|values| values.get(pattern_index))
                .is_some_and(|(_, props)| props.iter().any(|name| name == property));
            if in_property_list {
                return self.insert_shmem_object(
                    &namespace,
                    &device_name,
                    &sub_device_name,
                    sensor_key,
                    device_path,
                    property,
                    interface,
                    value,
                    ts_ms,
                );
            }
            self.mark_not_applicable(sensor_key);
        }
        // No candidate accepted the property; the key is parked.
        false
    }

    /// Differential update of an already-classified entry.
    fn handle_array_updates(
        &self,
        expanded: &Expanded,
        segment: &str,
        sensor_key: &str,
        ts_ms: u64,
        ts_iso: &str,
        prior_cardinality: usize,
    ) -> bool {
        let mut status = true;
        let store = lock(&self.store);

        if !expanded.is_list {
            for (_, entry) in &expanded.entries {
                if !store.update_value_and_timestamp(
                    segment,
                    sensor_key,
                    &entry.reading,
                    ts_ms,
                    ts_iso,
                ) {
                    status = false;
                }
            }
            return status;
        }

        let new_cardinality = expanded.entries.len();
        if new_cardinality <= prior_cardinality {
            // Shrink: erase the dropped tail, overwrite the survivors.
            for index in new_cardinality..prior_cardinality {
                let shm_key = format!("{sensor_key}/{index}");
                if !store.erase(segment, &shm_key) {
                    status = false;
                }
            }
            for (shm_key, entry) in &expanded.entries {
                if !store.update_value_and_timestamp(
                    segment,
                    shm_key,
                    &entry.reading,
                    ts_ms,
                    ts_iso,
                ) {
                    status = false;
                }
            }
        } else {
            // Growth: overwrite existing positions, insert the new tail.
            for (index, (shm_key, entry)) in expanded.entries.iter().enumerate() {
                if index < prior_cardinality {
                    if !store.update_value_and_timestamp(
                        segment,
                        shm_key,
                        &entry.reading,
                        ts_ms,
                        ts_iso,
                    ) {
                        status = false;
                    }
                } else {
                    let record = SensorValue::new(
                        entry.reading.clone(),
                        entry.resource_pointer.clone(),
                        ts_ms,
                        ts_iso.clone(),
                    );
                    if !store.insert(segment, shm_key, &record) {
                        status = false;
                    }
                }
            }
        }
        drop(store);

        lock(&self.classifications)
            .entry(sensor_key.to_string())
            .and_modify(|classification| classification.array_cardinality = new_cardinality);
        status
    }

    /// Primary hot path: insert the object on first sight, otherwise
    /// update value and timestamp (scalar) or run the list differential.
    pub fn update_object(
        &self,
        device_path: &str,
        interface: &str,
        property: &str,
        value: &PayloadValue,
        ts_ms: u64,
        associated_entity: &str,
    ) -> bool {
        let sensor_key = Self::sensor_key(device_path, interface, property);

        let classification = lock(&self.classifications).get(&sensor_key).cloned();
        if let Some(classification) = classification {
            let ts_iso = date_time_ms(wall_clock_ms(ts_ms));
            let segment = segment_name(&self.producer_name, &classification.namespace);

            if classification.array_cardinality == 0 {
                let reading = reading_for(property, interface, value);
                return lock(&self.store).update_value_and_timestamp(
                    &segment,
                    &sensor_key,
                    &reading,
                    ts_ms,
                    &ts_iso,
                );
            }

            let expanded = expand(
                &classification.namespace,
                &classification.device_name,
                &classification.sub_device_name,
                device_path,
                property,
                interface,
                value,
            );
            return self.handle_array_updates(
                &expanded,
                &segment,
                &sensor_key,
                ts_ms,
                &ts_iso,
                classification.array_cardinality,
            );
        }

        if lock(&self.not_applicable).contains(&sensor_key) {
            return true;
        }

        let candidates = self.parse_device_path(device_path);
        if candidates.is_empty() {
            log_error_limited(format!(
                "no matching namespace found for device path {device_path}"
            ));
            self.mark_not_applicable(&sensor_key);
            return false;
        }
        self.insert_object(
            candidates,
            device_path,
            interface,
            property,
            &sensor_key,
            value,
            ts_ms,
            associated_entity,
        )
    }

    /// No-reading transition: set the value to the literal `"nan"`. List
    /// entries keep only index 0; the cached cardinality drops to 1 so the
    /// next real update re-inserts the tail.
    pub fn mark_unavailable(
        &self,
        device_path: &str,
        interface: &str,
        property: &str,
        ts_ms: u64,
    ) -> bool {
        let sensor_key = Self::sensor_key(device_path, interface, property);

        let classification = lock(&self.classifications).get(&sensor_key).cloned();
        let Some(classification) = classification else {
            // Unknown or already parked as not applicable: nothing to do.
            return true;
        };

        let ts_iso = date_time_ms(wall_clock_ms(ts_ms));
        let segment = segment_name(&self.producer_name, &classification.namespace);
        let cardinality = classification.array_cardinality;
        let mut status = true;

        if cardinality >= 1 {
            let store = lock(&self.store);
            for index in 1..cardinality {
                let shm_key = format!("{sensor_key}/{index}");
                if !store.erase(&segment, &shm_key) {
                    status = false;
                }
            }
            let head_key = format!("{sensor_key}/0");
            if !store.update_value_and_timestamp(&segment, &head_key, "nan", ts_ms, &ts_iso) {
                log_error_limited(format!(
                    "update timestamp and value failed for {head_key}"
                ));
                status = false;
            }
            drop(store);
            lock(&self.classifications)
                .entry(sensor_key)
                .and_modify(|classification| classification.array_cardinality = 1);
        } else if !lock(&self.store).update_value_and_timestamp(
            &segment,
            &sensor_key,
            "nan",
            ts_ms,
            &ts_iso,
        ) {
            log_error_limited(format!(
                "update timestamp and value failed for {sensor_key}"
            ));
            status = false;
        }
        status
    }

    /// Producer this aggregator publishes for.
    pub fn producer_name(&self) -> &str {
        &self.producer_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns_config() -> NamespaceConfig {
        let mut config = NamespaceConfig::new();
        config.insert(
            "PlatformEnvironmentMetrics".to_string(),
            vec![(
                "xyz/openbmc_project/sensors".to_string(),
                vec!["Value".to_string()],
            )],
        );
        config.insert(
            "ProcessorMetrics".to_string(),
            vec![(
                "inventory/system/processors".to_string(),
                vec!["ceCount".to_string(), "ueCount".to_string(), "ThrottleReason".to_string()],
            )],
        );
        config
    }

    fn aggregator(producer: &str) -> SensorAggregator {
        SensorAggregator::new(producer.to_string(), ns_config())
    }

    #[test]
    fn match_count_orders_tokens() {
        let tokens = vec!["xyz", "openbmc_project", "inventory", "system", "processors", "GPU_SXM_1"];
        assert_eq!(
            SensorAggregator::match_count("inventory/system/processors", &tokens),
            3
        );
        assert_eq!(SensorAggregator::match_count("processors", &tokens), 1);
        // Substring containment counts as a token match.
        assert_eq!(SensorAggregator::match_count("GPU_SXM", &tokens), 1);
        // Order violations zero the count.
        assert_eq!(
            SensorAggregator::match_count("processors/inventory", &tokens),
            0
        );
        assert_eq!(SensorAggregator::match_count("nowhere", &tokens), 0);
    }

    #[test]
    fn parse_sensor_path_defers_device_to_association() {
        let agg = aggregator("gpumgrd");
        let candidates = agg.parse_device_path(
            "/xyz/openbmc_project/sensors/temperature/HGX_Chassis_0_HSC_0_Temp_0",
        );
        assert_eq!(candidates.len(), 1);
        let (namespace, device, sub_device, pattern_index) = &candidates[0];
        assert_eq!(namespace, "PlatformEnvironmentMetrics");
        // Sensor paths leave the device name to the associated entity.
        assert_eq!(device, "");
        assert_eq!(sub_device, "HGX_Chassis_0_HSC_0_Temp_0");
        assert_eq!(*pattern_index, 0);
    }

    #[test]
    fn longer_pattern_wins_and_uses_grandparent_device() {
        let mut config = ns_config();
        config.insert(
            "ProcessorPortMetrics".to_string(),
            vec![(
                "inventory/system/processors/Ports".to_string(),
                vec!["RXBytes".to_string()],
            )],
        );
        let agg = SensorAggregator::new("gpumgrd".to_string(), config);
        let candidates = agg.parse_device_path(
            "/xyz/openbmc_project/inventory/system/processors/GPU_SXM_1/Ports/NVLink_0",
        );
        // The 4-token pattern beats ProcessorMetrics' 3-token pattern.
        assert_eq!(candidates.len(), 1);
        let (namespace, device, sub_device, _) = &candidates[0];
        assert_eq!(namespace, "ProcessorPortMetrics");
        assert_eq!(device, "GPU_SXM_1");
        assert_eq!(sub_device, "NVLink_0");
    }

    #[test]
    fn unmatched_path_is_not_applicable() {
        let agg = aggregator("gpumgrd");
        let ok = agg.update_object(
            "/xyz/openbmc_project/software/slot_1",
            "xyz.openbmc_project.Software.Version",
            "Version",
            &PayloadValue::String("1.0".to_string()),
            1,
            "",
        );
        assert!(!ok);
        let key = "/xyz/openbmc_project/software/slot_1/xyz.openbmc_project.Software.Version.Version";
        assert!(agg.is_not_applicable(key));
        assert!(agg.classification(key).is_none());

        // Second call is a silent no-op returning true.
        assert!(agg.update_object(
            "/xyz/openbmc_project/software/slot_1",
            "xyz.openbmc_project.Software.Version",
            "Version",
            &PayloadValue::String("1.0".to_string()),
            2,
            "",
        ));
    }

    #[test]
    fn property_outside_list_is_not_applicable() {
        let agg = aggregator("testprod_prop");
        let ok = agg.update_object(
            "/xyz/openbmc_project/sensors/voltage/HGX_GPU_SXM_1_Voltage_0",
            "xyz.openbmc_project.Sensor.Value",
            "MinValue",
            &PayloadValue::Double(0.5),
            1,
            "HGX_GPU_SXM_1",
        );
        // No candidate accepted the property; the first call fails and the
        // key is parked.
        assert!(!ok);
        assert!(agg.is_not_applicable(
            "/xyz/openbmc_project/sensors/voltage/HGX_GPU_SXM_1_Voltage_0/xyz.openbmc_project.Sensor.Value.MinValue"
        ));
    }

    #[test]
    fn sensor_without_association_fails() {
        let agg = aggregator("testprod_assoc");
        let ok = agg.update_object(
            "/xyz/openbmc_project/sensors/temperature/HGX_Chassis_0_HSC_0_Temp_0",
            "xyz.openbmc_project.Sensor.Value",
            "Value",
            &PayloadValue::Double(19.0625),
            1,
            "",
        );
        assert!(!ok);
        assert!(agg.is_not_applicable(
            "/xyz/openbmc_project/sensors/temperature/HGX_Chassis_0_HSC_0_Temp_0/xyz.openbmc_project.Sensor.Value.Value"
        ));
    }
}
