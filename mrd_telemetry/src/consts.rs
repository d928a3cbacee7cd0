//! Platform build constants and naming helpers.

/// Device prefix baked into segment names and public URIs.
pub const PLATFORM_DEVICE_PREFIX: &str = "HGX_";

/// System id used for `/redfish/v1/Systems/<id>` resource pointers.
pub const PLATFORM_SYSTEM_ID: &str = "HGX_Baymax_0";

/// Default path of the namespace definition document (Doc A).
pub const NAMESPACE_CFG_JSON: &str = "/usr/share/mrd-telemetry/namespace_lookup.json";

/// Default path of the namespace size & producers document (Doc B).
pub const SHM_MAPPING_JSON: &str = "/usr/share/mrd-telemetry/shm_mapping.json";

/// Environment override for [`NAMESPACE_CFG_JSON`].
pub const NAMESPACE_CFG_ENV: &str = "MRD_NAMESPACE_CFG";

/// Environment override for [`SHM_MAPPING_JSON`].
pub const SHM_MAPPING_ENV: &str = "MRD_SHM_MAPPING";

/// Segment size used when a namespace is created lazily on first insert
/// instead of through the configured pre-creation path.
pub const DEFAULT_SEGMENT_BYTES: usize = 1024 * 1000;

/// Element-capacity hint handed to the map when sizing a fresh namespace.
pub const DEFAULT_ELEMENT_CAPACITY: usize = 1024;

/// Device paths starting with this prefix are sensor resources; their
/// device name comes from the associated entity, not the path.
pub const SENSORS_PATH_PREFIX: &str = "xyz/openbmc_project/sensors";

/// Suppression interval of the rate-limited error logger, in seconds.
pub const LOG_SUPPRESS_SECS: u64 = 60;

/// Maximum distinct messages tracked by the rate-limited error logger.
pub const LOG_MAX_ENTRIES: usize = 256;

/// Segment name for producer `producer` and namespace `namespace`:
/// `<producer>_<prefix><namespace>_0`.
pub fn segment_name(producer: &str, namespace: &str) -> String {
    format!("{producer}_{PLATFORM_DEVICE_PREFIX}{namespace}_0")
}

/// Consumer-facing segment stem for `namespace`: `<prefix><namespace>_0`.
pub fn segment_stem(namespace: &str) -> String {
    format!("{PLATFORM_DEVICE_PREFIX}{namespace}_0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_is_bit_exact() {
        assert_eq!(
            segment_name("gpumgrd", "PlatformEnvironmentMetrics"),
            "gpumgrd_HGX_PlatformEnvironmentMetrics_0"
        );
        assert_eq!(
            segment_stem("PlatformEnvironmentMetrics"),
            "HGX_PlatformEnvironmentMetrics_0"
        );
    }
}
