//! Producer-facade and consumer-facade round trip through real config
//! documents and shared-memory segments.
//!
//! Everything lives in one test: the config cache and the aggregator are
//! process-wide one-time values, so the scenario is driven end to end in
//! order.

use mrd_telemetry::aggregator::SensorAggregator;
use mrd_telemetry::config;
use mrd_telemetry::consts::{NAMESPACE_CFG_ENV, SHM_MAPPING_ENV};
use mrd_telemetry::error::TelemetryError;
use mrd_telemetry::payload::PayloadValue;
use mrd_telemetry::{client, producer};
use std::io::Write;
use tempfile::NamedTempFile;

const TEMP_PATH: &str = "/xyz/openbmc_project/sensors/temperature/HGX_Chassis_0_HSC_0_Temp_0";
const POWER_PATH: &str = "/xyz/openbmc_project/sensors/power/HGX_Chassis_0_HSC_0_Power_0";
const SENSOR_IFACE: &str = "xyz.openbmc_project.Sensor.Value";

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn producer_to_consumer_roundtrip() {
    let pid = std::process::id();
    let producer_a = format!("fgpumgrd{pid}");
    let producer_b = format!("fpldmd{pid}");

    let namespace_doc = write_file(
        r#"{
            "SensorNamespaces": [
                {
                    "Namespace": "PlatformEnvironmentMetrics",
                    "ObjectpathKeywords": "xyz/openbmc_project/sensors",
                    "PropertyList": ["Value"]
                }
            ]
        }"#,
    );
    let mapping_doc = write_file(&format!(
        r#"{{
            "Namespaces": {{
                "PlatformEnvironmentMetrics": {{
                    "SizeInBytes": 1024000,
                    "Producers": ["{producer_a}", "{producer_b}"]
                }},
                "EmptyMetrics": {{
                    "SizeInBytes": 1024000,
                    "Producers": ["neverstarted{pid}"]
                }}
            }}
        }}"#
    ));

    std::env::set_var(NAMESPACE_CFG_ENV, namespace_doc.path());
    std::env::set_var(SHM_MAPPING_ENV, mapping_doc.path());

    // init is idempotent and pre-creates the producer's namespaces.
    assert!(producer::init(&producer_a));
    assert!(producer::init(&producer_a));

    // The second producer publishes through its own aggregator, standing in
    // for another process.
    let loaded = config::load_global().unwrap();
    let agg_b = SensorAggregator::new(producer_b.clone(), loaded.namespace_configuration().clone());
    assert!(agg_b.create_namespaces(loaded));

    assert!(producer::update_telemetry(
        TEMP_PATH,
        SENSOR_IFACE,
        "Value",
        &PayloadValue::Double(19.0625),
        23_140_448,
        0,
        "HGX_Chassis_0",
    ));
    assert!(agg_b.update_object(
        POWER_PATH,
        SENSOR_IFACE,
        "Value",
        &PayloadValue::Double(240.5),
        23_140_500,
        "HGX_Chassis_0",
    ));

    // Consumer aggregation concatenates in producer directory order.
    let values = client::get_all_values("HGX_PlatformEnvironmentMetrics_0").unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].reading, "19.062500");
    assert_eq!(
        values[0].resource_pointer,
        "/redfish/v1/Chassis/HGX_Chassis_0/Sensors/HGX_Chassis_0_HSC_0_Temp_0"
    );
    assert_eq!(values[1].reading, "240.500000");

    // Namespace listing is derived from the mapping document.
    let namespaces = client::list_namespaces().unwrap();
    assert!(namespaces.contains(&"HGX_PlatformEnvironmentMetrics_0".to_string()));
    assert!(namespaces.contains(&"HGX_EmptyMetrics_0".to_string()));

    // Raw key/value access for tooling.
    let pairs = client::get_all_key_value_pairs(&format!(
        "{producer_a}_HGX_PlatformEnvironmentMetrics_0"
    ))
    .unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].0, format!("{TEMP_PATH}/{SENSOR_IFACE}.Value"));

    // Unknown namespace and empty namespace error taxonomy.
    assert!(matches!(
        client::get_all_values("HGX_Bogus_0"),
        Err(TelemetryError::NamespaceNotFound { .. })
    ));
    assert!(matches!(
        client::get_all_values("HGX_EmptyMetrics_0"),
        Err(TelemetryError::NoElements { .. })
    ));

    // rc != 0 with a non-zero timestamp marks the reading unavailable.
    assert!(producer::update_telemetry(
        TEMP_PATH,
        SENSOR_IFACE,
        "Value",
        &PayloadValue::Double(0.0),
        23_141_000,
        -1,
        "HGX_Chassis_0",
    ));
    let values = client::get_all_values("HGX_PlatformEnvironmentMetrics_0").unwrap();
    let nan_value = values
        .iter()
        .find(|value| value.resource_pointer.ends_with("HGX_Chassis_0_HSC_0_Temp_0"))
        .unwrap();
    assert_eq!(nan_value.reading, "nan");
}
