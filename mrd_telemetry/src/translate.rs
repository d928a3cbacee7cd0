//! Value translation: enumerated bus identifiers to display names,
//! interface/property pairs to resource-pointer suffixes, URI construction
//! and payload expansion.
//!
//! The tables here are the single source of truth for what gets published
//! and where. An empty resource pointer means "this combination is not
//! published" and makes the caller treat the key as not applicable.

use crate::consts::{PLATFORM_DEVICE_PREFIX, PLATFORM_SYSTEM_ID};
use crate::log_limit::log_error_limited;
use crate::payload::PayloadValue;
use crate::time::{duration_from_ms, duration_from_ns};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Reason-type and performance-state identifiers to display names.
static REASON_TYPE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.SWPowerCap",
            "SWPowerCap",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.HWSlowdown",
            "HWSlowdown",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.HWThermalSlowdown",
            "HWThermalSlowdown",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.HWPowerBrakeSlowdown",
            "HWPowerBrakeSlowdown",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.SyncBoost",
            "SyncBoost",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.GPUThermalOvertTreshold",
            "Current GPU temperature above the GPU Max Operating Temperature or Current memory temperature above the Memory Max Operating Temperature",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.ThrottleReasons.None",
            "NA",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.PerformanceStates.Normal",
            "Normal",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.PerformanceStates.Throttled",
            "Throttled",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.PerformanceStates.Degraded",
            "Degraded",
        ),
        (
            "xyz.openbmc_project.State.ProcessorPerformance.PerformanceStates.Unknown",
            "Unknown",
        ),
    ])
});

/// PCIe generation identifiers to display names.
static PCIE_TYPE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("xyz.openbmc_project.Inventory.Item.PCIeDevice.PCIeTypes.Gen1", "Gen1"),
        ("xyz.openbmc_project.Inventory.Item.PCIeDevice.PCIeTypes.Gen2", "Gen2"),
        ("xyz.openbmc_project.Inventory.Item.PCIeDevice.PCIeTypes.Gen3", "Gen3"),
        ("xyz.openbmc_project.Inventory.Item.PCIeDevice.PCIeTypes.Gen4", "Gen4"),
        ("xyz.openbmc_project.Inventory.Item.PCIeDevice.PCIeTypes.Gen5", "Gen5"),
    ])
});

/// Operational power-state identifiers to display names.
static POWER_STATE_TYPE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Absent", "Absent"),
        ("xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Deferring", "Deferring"),
        ("xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Disabled", "Disabled"),
        ("xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Enabled", "Enabled"),
        (
            "xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.StandbyOffline",
            "StandbyOffline",
        ),
        ("xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Starting", "Starting"),
        (
            "xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.UnavailableOffline",
            "UnavailableOffline",
        ),
        ("xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Updating", "Updating"),
    ])
});

/// Link status identifiers to display names.
static LINK_STATUS_TYPE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStatusType.LinkDown", "LinkDown"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStatusType.LinkUp", "LinkUp"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStatusType.NoLink", "NoLink"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStatusType.Starting", "Starting"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStatusType.Training", "Training"),
    ])
});

/// Link state identifiers to display names.
static LINK_STATE_TYPE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStates.Enabled", "Enabled"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStates.Disabled", "Disabled"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStates.Error", "Error"),
        ("xyz.openbmc_project.Inventory.Item.Port.LinkStates.Unknown", "Unknown"),
    ])
});

/// Power-system-input status identifiers to display names.
static POWER_SYSTEM_INPUT_TYPE_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([
            ("xyz.openbmc_project.State.Decorator.PowerSystemInputs.Status.Normal", "Normal"),
            ("xyz.openbmc_project.State.Decorator.PowerSystemInputs.Status.Fault", "Fault"),
            (
                "xyz.openbmc_project.State.Decorator.PowerSystemInputs.Status.InputOutOfRange",
                "InputOutOfRange",
            ),
        ])
    });

static PORT_INFO_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("CurrentSpeed", "#/CurrentSpeedGbps"),
        ("MaxSpeed", "#/MaxSpeedGbps"),
    ])
});

static PORT_STATE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([("LinkStatus", "#/LinkStatus"), ("LinkState", "#/Status/State")])
});

static IB_PORT_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("RXErrors", "/Metrics#/RXErrors"),
        ("TXPkts", "/Metrics#/Networking/TXFrames"),
        ("RXPkts", "/Metrics#/Networking/RXFrames"),
        ("RXMulticastPkts", "/Metrics#/Networking/RXMulticastFrames"),
        ("TXMulticastPkts", "/Metrics#/Networking/TXMulticastFrames"),
        ("RXUnicastPkts", "/Metrics#/Networking/RXUnicastFrames"),
        ("TXUnicastPkts", "/Metrics#/Networking/TXUnicastFrames"),
        ("TXDiscardPkts", "/Metrics#/Networking/TXDiscards"),
        ("MalformedPkts", "/Metrics#/Oem/Nvidia/MalformedPackets"),
        ("VL15DroppedPkts", "/Metrics#/Oem/Nvidia/VL15Dropped"),
        ("VL15TXPkts", "/Metrics#/Oem/Nvidia/VL15TXPackets"),
        ("VL15TXData", "/Metrics#/Oem/Nvidia/VL15TXBytes"),
        ("MTUDiscard", "/Metrics#/Oem/Nvidia/NeighborMTUDiscards"),
        ("SymbolError", "/Metrics#/Oem/Nvidia/SymbolErrors"),
        ("LinkErrorRecoveryCounter", "/Metrics#/Oem/Nvidia/LinkErrorRecoveryCount"),
        ("LinkDownCount", "/Metrics#/Oem/Nvidia/LinkDownedCount"),
        ("RXRemotePhysicalErrorPkts", "/Metrics#/Oem/Nvidia/RXRemotePhysicalErrors"),
        ("RXSwitchRelayErrorPkts", "/Metrics#/Oem/Nvidia/RXSwitchRelayErrors"),
        ("QP1DroppedPkts", "/Metrics#/Oem/Nvidia/QP1Dropped"),
        ("BitErrorRate", "/Metrics#/Oem/Nvidia/BitErrorRate"),
        ("TXWait", "/Metrics#/Oem/Nvidia/TXWait"),
    ])
});

static PORT_METRICS_OEM1_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("DataCRCCount", "/Metrics#/Oem/Nvidia/NVLinkErrors/DataCRCCount"),
        ("FlitCRCCount", "/Metrics#/Oem/Nvidia/NVLinkErrors/FlitCRCCount"),
        ("RecoveryCount", "/Metrics#/Oem/Nvidia/NVLinkErrors/RecoveryCount"),
        ("ReplayErrorsCount", "/Metrics#/Oem/Nvidia/NVLinkErrors/ReplayCount"),
    ])
});

static PORT_METRICS_OEM2_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([("RXBytes", "/Metrics#/RXBytes"), ("TXBytes", "/Metrics#/TXBytes")])
});

static PORT_METRICS_OEM3_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("RXNoProtocolBytes", "/Metrics#/Oem/Nvidia/RXNoProtocolBytes"),
        ("TXNoProtocolBytes", "/Metrics#/Oem/Nvidia/TXNoProtocolBytes"),
        ("RuntimeError", "/Metrics#/Oem/Nvidia/NVLinkErrors/RuntimeError"),
        ("TrainingError", "/Metrics#/Oem/Nvidia/NVLinkErrors/TrainingError"),
        ("TXWidth", "#/Oem/Nvidia/TXWidth"),
        ("RXWidth", "#/Oem/Nvidia/RXWidth"),
    ])
});

static PROCESSOR_PERF_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("ThrottleReason", "/Oem/Nvidia/ThrottleReasons"),
        ("PowerLimitThrottleDuration", "/PowerLimitThrottleDuration"),
        ("ThermalLimitThrottleDuration", "/ThermalLimitThrottleDuration"),
        ("AccumulatedSMUtilizationDuration", "/Oem/Nvidia/AccumulatedSMUtilizationDuration"),
        (
            "AccumulatedGPUContextUtilizationDuration",
            "/Oem/Nvidia/AccumulatedGPUContextUtilizationDuration",
        ),
        (
            "GlobalSoftwareViolationThrottleDuration",
            "/Oem/Nvidia/GlobalSoftwareViolationThrottleDuration",
        ),
        ("HardwareViolationThrottleDuration", "/Oem/Nvidia/HardwareViolationThrottleDuration"),
        ("PCIeTXBytes", "/Oem/Nvidia/PCIeTXBytes"),
        ("PCIeRXBytes", "/Oem/Nvidia/PCIeRXBytes"),
        ("Value", "#/Oem/Nvidia/PowerBreakPerformanceState"),
    ])
});

static NVLINK_METRICS_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("NVLinkRawTxBandwidthGbps", "/Oem/Nvidia/NVLinkRawTxBandwidthGbps"),
        ("NVLinkRawRxBandwidthGbps", "/Oem/Nvidia/NVLinkRawRxBandwidthGbps"),
        ("NVLinkDataTxBandwidthGbps", "/Oem/Nvidia/NVLinkDataTxBandwidthGbps"),
        ("NVLinkDataRxBandwidthGbps", "/Oem/Nvidia/NVLinkDataRxBandwidthGbps"),
    ])
});

static GPM_METRICS_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("NVDecInstanceUtilizationPercent", "/Oem/Nvidia/NVDecInstanceUtilizationPercent"),
        ("NVJpgInstanceUtilizationPercent", "/Oem/Nvidia/NVJpgInstanceUtilizationPercent"),
        ("GraphicsEngineActivityPercent", "/Oem/Nvidia/GraphicsEngineActivityPercent"),
        ("SMActivityPercent", "/Oem/Nvidia/SMActivityPercent"),
        ("SMOccupancyPercent", "/Oem/Nvidia/SMOccupancyPercent"),
        ("TensorCoreActivityPercent", "/Oem/Nvidia/TensorCoreActivityPercent"),
        ("FP64ActivityPercent", "/Oem/Nvidia/FP64ActivityPercent"),
        ("FP32ActivityPercent", "/Oem/Nvidia/FP32ActivityPercent"),
        ("FP16ActivityPercent", "/Oem/Nvidia/FP16ActivityPercent"),
        ("NVDecUtilizationPercent", "/Oem/Nvidia/NVDecUtilizationPercent"),
        ("NVJpgUtilizationPercent", "/Oem/Nvidia/NVJpgUtilizationPercent"),
        ("NVOfaUtilizationPercent", "/Oem/Nvidia/NVOfaUtilizationPercent"),
        ("PCIeRawTxBandwidthGbps", "/Oem/Nvidia/PCIeRawTxBandwidthGbps"),
        ("PCIeRawRxBandwidthGbps", "/Oem/Nvidia/PCIeRawRxBandwidthGbps"),
        ("IntegerActivityUtilizationPercent", "/Oem/Nvidia/IntegerActivityUtilizationPercent"),
        ("DMMAUtilizationPercent", "/Oem/Nvidia/DMMAUtilizationPercent"),
        ("HMMAUtilizationPercent", "/Oem/Nvidia/HMMAUtilizationPercent"),
        ("IMMAUtilizationPercent", "/Oem/Nvidia/IMMAUtilizationPercent"),
    ])
});

static PCIE_ECC_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("nonfeCount", "/PCIeErrors/NonFatalErrorCount"),
        ("feCount", "/PCIeErrors/FatalErrorCount"),
        ("ceCount", "/PCIeErrors/CorrectableErrorCount"),
        ("PCIeECC.ceCount", "/PCIeErrors/CorrectableErrorCount"),
        ("L0ToRecoveryCount", "/PCIeErrors/L0ToRecoveryCount"),
        ("NAKReceivedCount", "/PCIeErrors/NAKReceivedCount"),
        ("ReplayCount", "/PCIeErrors/ReplayCount"),
        ("NAKSentCount", "/PCIeErrors/NAKSentCount"),
        ("ReplayRolloverCount", "/PCIeErrors/ReplayRolloverCount"),
        ("UnsupportedRequestCount", "/PCIeErrors/UnsupportedRequestCount"),
        ("PCIeType", "#/PCIeInterface/PCIeType"),
        ("MaxLanes", "#/PCIeInterface/MaxLanes"),
        ("LanesInUse", "#/PCIeInterface/LanesInUse"),
    ])
});

static MEMORY_ECC_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("ueCount", "/UncorrectableECCErrorCount"),
        ("ceCount", "/CorrectableECCErrorCount"),
    ])
});

static OPERATING_CONFIG_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("Utilization", "/BandwidthPercent"),
        ("OperatingSpeed", "/OperatingSpeedMHz"),
        ("MaxSpeed", "/MaxSpeedMHz"),
        ("MinSpeed", "/MinSpeedMHz"),
        ("SpeedLimit", "/SpeedLimitMHz"),
        ("SpeedLocked", "/SpeedLocked"),
    ])
});

static DIMM_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("MemoryConfiguredSpeedInMhz", "/OperatingSpeedMHz"),
        ("Utilization", "/BandwidthPercent"),
    ])
});

static PCIE_DEVICE_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("PCIeType", "#/PCIeInterface/PCIeType"),
        ("MaxPCIeType", "#/PCIeInterface/MaxPCIeType"),
        ("LanesInUse", "#/PCIeInterface/LanesInUse"),
        ("MaxLanes", "#/PCIeInterface/MaxLanes"),
    ])
});

static MEMORY_ROW_REMAPPING_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([
            ("ueRowRemappingCount", "/Oem/Nvidia/RowRemapping/UncorrectableRowRemappingCount"),
            ("ceRowRemappingCount", "/Oem/Nvidia/RowRemapping/CorrectableRowRemappingCount"),
            ("RowRemappingFailureState", "/Oem/Nvidia/RowRemappingFailed"),
            (
                "MaxRemappingAvailablityBankCount",
                "/Oem/Nvidia/RowRemapping/MaxAvailablityBankCount",
            ),
            (
                "HighRemappingAvailablityBankCount",
                "/Oem/Nvidia/RowRemapping/HighAvailablityBankCount",
            ),
            (
                "PartialRemappingAvailablityBankCount",
                "/Oem/Nvidia/RowRemapping/PartialAvailablityBankCount",
            ),
            (
                "LowRemappingAvailablityBankCount",
                "/Oem/Nvidia/RowRemapping/LowAvailablityBankCount",
            ),
            (
                "NoRemappingAvailablityBankCount",
                "/Oem/Nvidia/RowRemapping/NoAvailablityBankCount",
            ),
        ])
    });

static CAPACITY_UTILIZATION_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([("CapacityUtilizationPercent", "/CapacityUtilizationPercent")])
    });

static SM_UTILIZATION_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([("SMUtilization", "/Oem/Nvidia/SMUtilizationPercent")])
});

static OPERATIONAL_STATUS_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("State", "/Status/State")]));

static MEMORY_SPARE_CHANNEL_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([("MemorySpareChannelPresence", "#/Oem/Nvidia/MemorySpareChannelPresence")])
    });

static EDP_VIOLATION_STATE_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("Status", "#/Oem/Nvidia/EDPViolationState")]));

static SWITCH_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("CurrentBandwidth", "/CurrentBandwidthGbps"),
        ("MaxBandwidth", "/MaxBandwidthGbps"),
    ])
});

static POWER_LIMIT_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([("MaxPowerWatts", "/MaxPowerWatts"), ("MinPowerWatts", "/MinPowerWatts")])
});

static PCIE_REF_CLOCK_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([("PCIeReferenceClockEnabled", "#/Oem/Nvidia/PCIeReferenceClockEnabled")])
});

static PORT_WIDTH_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("ActiveWidth", "#/ActiveWidth")]));

static HEALTH_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("Health", "#/Status/Health")]));

static HEALTH_ROLLUP_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("HealthRollup", "#/Status/HealthRollup")]));

/// Per-interface metric-name → suffix table.
fn suffix_map(iface_name: &str) -> Option<&'static HashMap<&'static str, &'static str>> {
    match iface_name {
        "xyz.openbmc_project.Inventory.Decorator.PortInfo" => Some(&PORT_INFO_MAP),
        "xyz.openbmc_project.Inventory.Decorator.PortState" => Some(&PORT_STATE_MAP),
        "xyz.openbmc_project.Metrics.IBPort" => Some(&IB_PORT_MAP),
        "xyz.openbmc_project.Metrics.PortMetricsOem1" => Some(&PORT_METRICS_OEM1_MAP),
        "xyz.openbmc_project.Metrics.PortMetricsOem2" => Some(&PORT_METRICS_OEM2_MAP),
        "xyz.openbmc_project.Metrics.PortMetricsOem3" => Some(&PORT_METRICS_OEM3_MAP),
        "xyz.openbmc_project.State.ProcessorPerformance" => Some(&PROCESSOR_PERF_MAP),
        "com.nvidia.NVLink.NVLinkMetrics" => Some(&NVLINK_METRICS_MAP),
        "com.nvidia.GPMMetrics" => Some(&GPM_METRICS_MAP),
        "xyz.openbmc_project.PCIe.PCIeECC" => Some(&PCIE_ECC_MAP),
        "xyz.openbmc_project.Inventory.Item.Dimm.MemoryMetrics" => Some(&CAPACITY_UTILIZATION_MAP),
        "xyz.openbmc_project.Memory.MemoryECC" => Some(&MEMORY_ECC_MAP),
        "xyz.openbmc_project.Inventory.Item.Cpu.OperatingConfig" => Some(&OPERATING_CONFIG_MAP),
        "com.nvidia.SMUtilization" => Some(&SM_UTILIZATION_MAP),
        "xyz.openbmc_project.Inventory.Decorator.PowerLimit" => Some(&POWER_LIMIT_MAP),
        "xyz.openbmc_project.Inventory.Item.Dimm" => Some(&DIMM_MAP),
        "xyz.openbmc_project.Inventory.Item.PCIeDevice" => Some(&PCIE_DEVICE_MAP),
        "xyz.openbmc_project.Inventory.Item.Switch" => Some(&SWITCH_MAP),
        "xyz.openbmc_project.State.Decorator.OperationalStatus" => Some(&OPERATIONAL_STATUS_MAP),
        "com.nvidia.MemoryRowRemapping" => Some(&MEMORY_ROW_REMAPPING_MAP),
        "com.nvidia.MemorySpareChannel" => Some(&MEMORY_SPARE_CHANNEL_MAP),
        "xyz.openbmc_project.State.Decorator.PowerSystemInputs" => Some(&EDP_VIOLATION_STATE_MAP),
        "xyz.openbmc_project.Inventory.Decorator.PortWidth" => Some(&PORT_WIDTH_MAP),
        "xyz.openbmc_project.Inventory.Decorator.PCIeRefClock" => Some(&PCIE_REF_CLOCK_MAP),
        "xyz.openbmc_project.State.Decorator.Health" => Some(&HEALTH_MAP),
        "xyz.openbmc_project.State.Decorator.HealthRollup" => Some(&HEALTH_ROLLUP_MAP),
        _ => None,
    }
}

/// Resource-pointer suffix for an interface/metric pair; empty when the
/// pair is not mapped.
pub fn property_suffix(iface_name: &str, metric_name: &str) -> &'static str {
    suffix_map(iface_name)
        .and_then(|map| map.get(metric_name))
        .copied()
        .unwrap_or("")
}

/// Throttle-reason (and performance-state) identifier to short name;
/// unknown identifiers map to the empty string.
pub fn reason_type(reason: &str) -> &'static str {
    REASON_TYPE_MAP.get(reason).copied().unwrap_or("")
}

/// PCIe generation identifier to `GenN`; unknown identifiers map to
/// `Unknown`.
pub fn pcie_type(pcie: &str) -> &'static str {
    PCIE_TYPE_MAP.get(pcie).copied().unwrap_or("Unknown")
}

/// Operational power-state identifier to display name; unknown → empty.
pub fn power_state_type(state: &str) -> &'static str {
    POWER_STATE_TYPE_MAP.get(state).copied().unwrap_or("")
}

/// Link status identifier to display name; unknown → empty.
pub fn link_status_type(status: &str) -> &'static str {
    LINK_STATUS_TYPE_MAP.get(status).copied().unwrap_or("")
}

/// Link state identifier to display name; unknown → empty.
pub fn link_state_type(state: &str) -> &'static str {
    LINK_STATE_TYPE_MAP.get(state).copied().unwrap_or("")
}

/// Power-system-input status identifier to display name; unknown → empty.
pub fn power_system_input_type(status: &str) -> &'static str {
    POWER_SYSTEM_INPUT_TYPE_MAP.get(status).copied().unwrap_or("")
}

/// Translate a string reading according to its interface and metric name.
pub fn translate_reading(iface_name: &str, metric_name: &str, reading: &str) -> String {
    match iface_name {
        "xyz.openbmc_project.State.ProcessorPerformance" => match metric_name {
            "ThrottleReason" | "Value" => reason_type(reading).to_string(),
            _ => String::new(),
        },
        "xyz.openbmc_project.PCIe.PCIeECC" => match metric_name {
            "PCIeType" => pcie_type(reading).to_string(),
            _ => String::new(),
        },
        "xyz.openbmc_project.Inventory.Decorator.PortState" => match metric_name {
            "LinkStatus" => link_status_type(reading).to_string(),
            "LinkState" => link_state_type(reading).to_string(),
            _ => String::new(),
        },
        "xyz.openbmc_project.State.Decorator.PowerSystemInputs" => match metric_name {
            "Status" => power_system_input_type(reading).to_string(),
            _ => String::new(),
        },
        "xyz.openbmc_project.State.Decorator.OperationalStatus" => match metric_name {
            "State" => power_state_type(reading).to_string(),
            _ => String::new(),
        },
        _ => reading.to_string(),
    }
}

/// Last path component.
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// The four throttle-duration properties render as a nanosecond duration;
/// everything else as plain decimal.
fn translate_throttle_duration(metric_name: &str, reading: u64) -> String {
    match metric_name {
        "PowerLimitThrottleDuration"
        | "ThermalLimitThrottleDuration"
        | "HardwareViolationThrottleDuration"
        | "GlobalSoftwareViolationThrottleDuration" => {
            duration_from_ns(reading).unwrap_or_default()
        }
        _ => reading.to_string(),
    }
}

/// Accumulated-utilization durations render from milliseconds.
fn translate_accumulated_duration(reading: u64) -> String {
    duration_from_ms(reading).unwrap_or_default()
}

/// Render one scalar payload to its canonical reading string.
fn render_scalar(iface_name: &str, metric_name: &str, value: &PayloadValue) -> String {
    match value {
        PayloadValue::String(reading) => translate_reading(iface_name, metric_name, reading),
        PayloadValue::Int16(v) => v.to_string(),
        PayloadValue::Int32(v) => v.to_string(),
        PayloadValue::Int64(v) => v.to_string(),
        PayloadValue::UInt16(v) => v.to_string(),
        PayloadValue::UInt32(v) => v.to_string(),
        PayloadValue::UInt64(v) => {
            if iface_name == "xyz.openbmc_project.State.ProcessorPerformance"
                && (metric_name == "AccumulatedSMUtilizationDuration"
                    || metric_name == "AccumulatedGPUContextUtilizationDuration")
            {
                translate_accumulated_duration(*v)
            } else {
                translate_throttle_duration(metric_name, *v)
            }
        }
        PayloadValue::Double(v) => format!("{v:.6}"),
        PayloadValue::Bool(v) => if *v { "true" } else { "false" }.to_string(),
        PayloadValue::StringList(_) | PayloadValue::DoubleList(_) | PayloadValue::Opaque => {
            String::new()
        }
    }
}

/// Build the public resource pointer for a device/metric combination.
/// An empty result means the combination is not published.
pub fn generate_uri(
    device_type: &str,
    device_name: &str,
    sub_device_name: &str,
    device_path: &str,
    metric_name: &str,
    iface_name: &str,
) -> String {
    let mut uri = String::new();
    let mut suffix = "";
    match device_type {
        "PlatformEnvironmentMetrics" => {
            uri = format!("/redfish/v1/Chassis/{device_name}/Sensors/{sub_device_name}");
        }
        "CpuProcessorMetrics" => {
            if iface_name == "xyz.openbmc_project.Sensor.Value" {
                uri = format!(
                    "/redfish/v1/Chassis/{PLATFORM_DEVICE_PREFIX}{device_name}/Sensors/{sub_device_name}"
                );
            } else if iface_name == "com.nvidia.MemorySpareChannel"
                || iface_name == "xyz.openbmc_project.State.Decorator.PowerSystemInputs"
                || iface_name == "xyz.openbmc_project.State.ProcessorPerformance"
            {
                uri = format!(
                    "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}/ProcessorMetrics"
                );
                suffix = property_suffix(iface_name, metric_name);
            } else {
                uri = format!(
                    "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}/Ports/{sub_device_name}"
                );
                suffix = property_suffix(iface_name, metric_name);
            }
        }
        "ProcessorPortMetrics" => {
            uri = format!(
                "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}/Ports/{sub_device_name}"
            );
            suffix = property_suffix(iface_name, metric_name);
        }
        "ProcessorPortGPMMetrics" => {
            uri = format!(
                "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}/Ports/{sub_device_name}/Metrics#"
            );
            suffix = property_suffix(iface_name, metric_name);
        }
        "NVSwitchPortMetrics" => {
            uri = format!(
                "/redfish/v1/Fabrics/{PLATFORM_DEVICE_PREFIX}NVLinkFabric_0/Switches/{device_name}/Ports/{sub_device_name}"
            );
            suffix = property_suffix(iface_name, metric_name);
        }
        "NetworkAdapterPortMetrics" => {
            uri = format!(
                "/redfish/v1/Chassis/{PLATFORM_DEVICE_PREFIX}{device_name}/NetworkAdapters/{device_name}/Ports/{sub_device_name}"
            );
            suffix = property_suffix(iface_name, metric_name);
        }
        "ProcessorMetrics" => {
            uri = format!(
                "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}/ProcessorMetrics#"
            );
            if iface_name == "xyz.openbmc_project.Memory.MemoryECC" {
                uri.push_str("/CacheMetricsTotal/LifeTime");
            } else if iface_name == "xyz.openbmc_project.PCIe.PCIeECC" {
                if metric_name == "PCIeType"
                    || metric_name == "MaxLanes"
                    || metric_name == "LanesInUse"
                {
                    let child_device = basename(device_path);
                    uri = format!(
                        "/redfish/v1/Chassis/{PLATFORM_DEVICE_PREFIX}{child_device}/PCIeDevices/{child_device}"
                    );
                }
            } else if iface_name == "xyz.openbmc_project.State.Decorator.OperationalStatus" {
                uri = format!(
                    "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}#"
                );
            } else if iface_name == "xyz.openbmc_project.Inventory.Decorator.PowerLimit" {
                uri = format!("/redfish/v1/Chassis/{PLATFORM_DEVICE_PREFIX}{device_name}#");
            } else if iface_name == "xyz.openbmc_project.Inventory.Item.Cpu.OperatingConfig"
                && (metric_name == "MaxSpeed"
                    || metric_name == "MinSpeed"
                    || metric_name == "SpeedLimit"
                    || metric_name == "SpeedLocked")
            {
                uri = format!(
                    "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}#"
                );
            }
            suffix = property_suffix(iface_name, metric_name);
        }
        "ProcessorGPMMetrics" => {
            uri = format!(
                "/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Processors/{device_name}/ProcessorMetrics#"
            );
            suffix = property_suffix(iface_name, metric_name);
        }
        "NVSwitchMetrics" => {
            uri = format!(
                "/redfish/v1/Fabrics/{PLATFORM_DEVICE_PREFIX}NVLinkFabric_0/Switches/{device_name}"
            );
            if !(metric_name == "CurrentBandwidth" || metric_name == "MaxBandwidth") {
                uri.push_str("/SwitchMetrics#");
            } else {
                uri.push('#');
            }
            if iface_name == "xyz.openbmc_project.Memory.MemoryECC" {
                uri.push_str("/InternalMemoryMetrics/LifeTime");
            }
            suffix = property_suffix(iface_name, metric_name);
        }
        "PCIeRetimerMetrics" => {
            uri = format!("/redfish/v1/Chassis/{device_name}/PCIeDevices/{sub_device_name}");
            suffix = property_suffix(iface_name, metric_name);
        }
        "PCIeRetimerPortMetrics" => {
            let retimer_id = device_name.rsplit_once('_').map_or("0", |(_, id)| id);
            uri = format!(
                "/redfish/v1/Fabrics/{PLATFORM_DEVICE_PREFIX}PCIeRetimerTopology_{retimer_id}/Switches/{device_name}/Ports/{sub_device_name}"
            );
            if iface_name == "xyz.openbmc_project.PCIe.PCIeECC" {
                uri.push_str("/Metrics#");
            }
            suffix = property_suffix(iface_name, metric_name);
        }
        "MemoryMetrics" => {
            uri = format!("/redfish/v1/Systems/{PLATFORM_SYSTEM_ID}/Memory/{device_name}");
            if iface_name == "com.nvidia.MemoryRowRemapping" {
                if metric_name == "RowRemappingFailureState"
                    || metric_name == "RowRemappingPendingState"
                {
                    uri.push('#');
                } else {
                    uri.push_str("/MemoryMetrics#");
                }
            } else if iface_name == "xyz.openbmc_project.Inventory.Item.Dimm.MemoryMetrics" {
                if metric_name == "CapacityUtilizationPercent" {
                    uri.push_str("/MemoryMetrics#");
                }
            } else if iface_name == "xyz.openbmc_project.Memory.MemoryECC" {
                uri.push_str("/MemoryMetrics#/LifeTime");
            } else {
                uri.push_str("/MemoryMetrics#");
            }
            suffix = property_suffix(iface_name, metric_name);
        }
        "HealthMetrics" => {
            uri = format!("/redfish/v1/Chassis/{PLATFORM_DEVICE_PREFIX}");
            let system_id = format!("{PLATFORM_DEVICE_PREFIX}{device_name}");
            if system_id == PLATFORM_SYSTEM_ID {
                uri = format!("/redfish/v1/Systems/{PLATFORM_DEVICE_PREFIX}");
            }
            uri.push_str(device_name);
            suffix = property_suffix(iface_name, metric_name);
        }
        _ => uri.clear(),
    }

    if !suffix.is_empty() {
        uri.push_str(suffix);
    }
    uri
}

/// One expanded map entry: where the reading is published and its rendered
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEntry {
    /// Public resource pointer, with `/<index>` appended for list items.
    pub resource_pointer: String,
    /// Canonical reading string.
    pub reading: String,
}

/// Result of payload expansion: shared-memory keys with their entries, in
/// list order, plus the list flag.
#[derive(Debug, Clone, Default)]
pub struct Expanded {
    /// `(shm key, entry)` pairs; one pair per list element, or a single
    /// pair for scalars. Empty when the resource pointer is empty.
    pub entries: Vec<(String, MetricEntry)>,
    /// Whether the payload was list-typed.
    pub is_list: bool,
}

/// Expand a payload into map entries. Used at discovery time and for list
/// updates; scalar fast-path updates use [`reading_for`] instead.
#[allow(clippy::too_many_arguments)]
pub fn expand(
    device_type: &str,
    device_name: &str,
    sub_device_name: &str,
    device_path: &str,
    metric_name: &str,
    iface_name: &str,
    value: &PayloadValue,
) -> Expanded {
    let mut out = Expanded::default();
    match value {
        PayloadValue::StringList(readings) => {
            // Each element is published as "PropertyName/<index>", starting
            // at 0, e.g. ThrottleReasons: [Idle, AppClock] -> .../0, .../1.
            out.is_list = true;
            for (index, reading) in readings.iter().enumerate() {
                let translated = translate_reading(iface_name, metric_name, reading);
                let uri = generate_uri(
                    device_type,
                    device_name,
                    sub_device_name,
                    device_path,
                    metric_name,
                    iface_name,
                );
                let key = format!("{device_path}/{iface_name}.{metric_name}/{index}");
                out.entries.push((
                    key,
                    MetricEntry {
                        resource_pointer: format!("{uri}/{index}"),
                        reading: translated,
                    },
                ));
            }
        }
        PayloadValue::DoubleList(readings) => {
            out.is_list = true;
            for (index, reading) in readings.iter().enumerate() {
                let uri = generate_uri(
                    device_type,
                    device_name,
                    sub_device_name,
                    device_path,
                    metric_name,
                    iface_name,
                );
                let key = format!("{device_path}/{iface_name}.{metric_name}/{index}");
                out.entries.push((
                    key,
                    MetricEntry {
                        resource_pointer: format!("{uri}/{index}"),
                        reading: format!("{reading:.6}"),
                    },
                ));
            }
        }
        scalar => {
            let uri = generate_uri(
                device_type,
                device_name,
                sub_device_name,
                device_path,
                metric_name,
                iface_name,
            );
            if uri.is_empty() {
                log_error_limited(format!(
                    "empty resource pointer for deviceType {device_type} deviceName \
                     {device_name} subDeviceName {sub_device_name} devicePath {device_path} \
                     metricName {metric_name} ifaceName {iface_name}"
                ));
                return out;
            }
            let key = format!("{device_path}/{iface_name}.{metric_name}");
            out.entries.push((
                key,
                MetricEntry {
                    resource_pointer: uri,
                    reading: render_scalar(iface_name, metric_name, scalar),
                },
            ));
        }
    }
    out
}

/// Render just the reading for a scalar update of an already-classified
/// key.
pub fn reading_for(metric_name: &str, iface_name: &str, value: &PayloadValue) -> String {
    render_scalar(iface_name, metric_name, value)
}
