//! Consumer facade: aggregate values across every producer publishing
//! into an MRD namespace.
//!
//! Producer segments are opened read-only on first use and cached for the
//! process lifetime; a producer that has not published yet is skipped and
//! retried on the next call.

use crate::config;
use crate::error::{TelemetryError, TelemetryResult};
use mrd_shmem::{SensorMap, SensorValue};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use tracing::{error, info};

static OPEN_MAPS: LazyLock<Mutex<HashMap<String, SensorMap>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn open_maps() -> std::sync::MutexGuard<'static, HashMap<String, SensorMap>> {
    match OPEN_MAPS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// All values published under `mrd_namespace` (a segment stem such as
/// `HGX_PlatformEnvironmentMetrics_0`), concatenated over its producers in
/// directory order.
///
/// # Errors
/// [`TelemetryError::NamespaceNotFound`] when the namespace is not in the
/// consumer directory; [`TelemetryError::NoElements`] when every producer
/// segment was empty or unreadable.
pub fn get_all_values(mrd_namespace: &str) -> TelemetryResult<Vec<SensorValue>> {
    let loaded_config = config::load_global()?;
    let directory = loaded_config.consumer_directory();
    let Some(producers) = directory.get(mrd_namespace) else {
        error!(namespace = mrd_namespace, "namespace is not found in the MRD lookup");
        return Err(TelemetryError::NamespaceNotFound {
            namespace: mrd_namespace.to_string(),
        });
    };

    let mut values = Vec::new();
    let mut maps = open_maps();
    for producer in producers {
        let segment = format!("{producer}_{mrd_namespace}");
        if !maps.contains_key(&segment) {
            match SensorMap::readonly(&segment) {
                Ok(map) => {
                    maps.insert(segment.clone(), map);
                }
                Err(e) => {
                    error!(%segment, error = %e, "opening producer segment failed");
                    continue;
                }
            }
        }
        let map = &maps[&segment];
        match map.get_all() {
            Ok(mut segment_values) if !segment_values.is_empty() => {
                info!(
                    %segment,
                    elements = segment_values.len(),
                    "collected namespace elements"
                );
                values.append(&mut segment_values);
            }
            Ok(_) => {
                error!(%segment, "namespace has no elements");
            }
            Err(e) => {
                error!(%segment, error = %e, "reading namespace failed");
            }
        }
    }

    if values.is_empty() {
        error!(namespace = mrd_namespace, "namespace has no elements");
        return Err(TelemetryError::NoElements {
            namespace: mrd_namespace.to_string(),
        });
    }
    Ok(values)
}

/// Raw (key, value) dump of one producer segment, for tooling.
///
/// # Errors
/// [`TelemetryError::NoElements`] when the segment is empty; shared-memory
/// errors (absent segment, lock timeout) pass through.
pub fn get_all_key_value_pairs(segment_name: &str) -> TelemetryResult<Vec<(String, SensorValue)>> {
    let mut maps = open_maps();
    if !maps.contains_key(segment_name) {
        let map = SensorMap::readonly(segment_name)?;
        maps.insert(segment_name.to_string(), map);
    }
    let pairs = maps[segment_name].get_all_pairs()?;
    if pairs.is_empty() {
        return Err(TelemetryError::NoElements {
            namespace: segment_name.to_string(),
        });
    }
    Ok(pairs)
}

/// Every known namespace stem from the consumer directory, sorted.
pub fn list_namespaces() -> TelemetryResult<Vec<String>> {
    let loaded_config = config::load_global()?;
    let mut stems: Vec<String> = loaded_config.consumer_directory().into_keys().collect();
    stems.sort();
    Ok(stems)
}
