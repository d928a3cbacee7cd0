//! Producer facade: one-time process initialization and the telemetry
//! update entry point.
//!
//! The aggregator is a one-time-initialized module value; `init` must
//! succeed before `update_telemetry` does anything.

use crate::aggregator::SensorAggregator;
use crate::config;
use crate::payload::PayloadValue;
use std::sync::OnceLock;
use tracing::{debug, error, info};

static AGGREGATOR: OnceLock<SensorAggregator> = OnceLock::new();

/// Initialize shared-memory publishing for `producer_name`: load both
/// config documents, build the aggregator and pre-create this producer's
/// namespaces. Idempotent; repeated calls re-verify the namespaces.
pub fn init(producer_name: &str) -> bool {
    info!(producer = producer_name, "initializing shm namespaces");

    let loaded_config = match config::load_global() {
        Ok(loaded_config) => loaded_config,
        Err(e) => {
            error!(error = %e, "loading shm config failed");
            return false;
        }
    };

    if let Some(existing) = AGGREGATOR.get() {
        if existing.producer_name() != producer_name {
            error!(
                producer = producer_name,
                initialized_for = existing.producer_name(),
                "aggregator already initialized for another producer"
            );
            return false;
        }
        return existing.create_namespaces(loaded_config);
    }

    let aggregator = SensorAggregator::new(
        producer_name.to_string(),
        loaded_config.namespace_configuration().clone(),
    );
    AGGREGATOR
        .get_or_init(|| aggregator)
        .create_namespaces(loaded_config)
}

/// Publish one telemetry update. A non-zero `rc` with a non-zero
/// timestamp marks the reading unavailable; everything else updates or
/// inserts the object. Returns `false` until [`init`] has succeeded.
#[allow(clippy::too_many_arguments)]
pub fn update_telemetry(
    device_path: &str,
    interface: &str,
    property: &str,
    value: &PayloadValue,
    ts_ms: u64,
    rc: i32,
    associated_entity: &str,
) -> bool {
    let Some(aggregator) = AGGREGATOR.get() else {
        return false;
    };
    if rc != 0 && ts_ms != 0 {
        debug!(device_path, interface, property, "updating nan value");
        aggregator.mark_unavailable(device_path, interface, property, ts_ms)
    } else {
        debug!(device_path, interface, property, "updating object");
        aggregator.update_object(
            device_path,
            interface,
            property,
            value,
            ts_ms,
            associated_entity,
        )
    }
}
