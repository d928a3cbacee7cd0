//! # MRD SMBus-Target Publisher
//!
//! Thin file-writer companion to the shared-memory telemetry path. A CSV
//! table maps selected bus properties onto byte ranges of an
//! EEPROM-backed sysfs node exposed to an SMBus controller; on every
//! telemetry refresh the mapped bytes are committed at their configured
//! offset and a per-record staleness bit is maintained.
//!
//! The table carries two header records (`slave_version`,
//! `staleness_threshold`) followed by the column header and one record per
//! sensor:
//!
//! ```csv
//! slave_version,0x01
//! staleness_threshold,5000
//! offset,length,data_format,dbus_objectpath,dbus_interface,dbus_property,stale_offset,stale_bit
//! 0x00,4,float,/xyz/openbmc_project/sensors/temperature/T0,xyz.openbmc_project.Sensor.Value,Value,0x80,0
//! ```
//!
//! `stale_offset`/`stale_bit` may be `NA` for records without a staleness
//! bit.

#![deny(missing_docs)]
#![warn(clippy::all)]

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info};

/// Columns of one sensor data record.
const DATA_RECORD_FIELDS: usize = 8;

/// Default CSV table path.
pub const SMBUS_CSV_PATH: &str = "/usr/share/mrd-telemetry/smbus_telemetry.csv";

/// Default EEPROM sysfs node path.
pub const SMBUS_EEPROM_PATH: &str = "/sys/bus/i2c/devices/1-0050/eeprom";

/// Environment override for [`SMBUS_CSV_PATH`].
pub const SMBUS_CSV_ENV: &str = "MRD_SMBUS_CSV";

/// Environment override for [`SMBUS_EEPROM_PATH`].
pub const SMBUS_EEPROM_ENV: &str = "MRD_SMBUS_EEPROM";

/// Errors raised by table loading and record updates.
#[derive(Debug, Error)]
pub enum SmbusError {
    /// CSV table missing at the configured path.
    #[error("smbus telemetry config CSV not found: {path}")]
    ConfigFileNotFound {
        /// Path that was probed.
        path: String,
    },

    /// CSV table malformed (bad headers, wrong field count, bad number).
    #[error("invalid smbus config data: {reason}")]
    InvalidConfigData {
        /// What failed to validate.
        reason: String,
    },

    /// EEPROM sysfs node missing or unopenable.
    #[error("smbus eeprom file not found: {path}")]
    SysfsPathNotFound {
        /// Path that was probed.
        path: String,
    },

    /// IO failure while committing to the EEPROM node.
    #[error("smbus eeprom IO failed: {source}")]
    Io {
        /// Underlying IO error.
        #[from]
        source: std::io::Error,
    },
}

/// One sensor record from the CSV table.
#[derive(Debug, Clone)]
struct SensorRecord {
    offset: u16,
    length: usize,
    stale_offset: Option<u16>,
    stale_bit: Option<u8>,
    previous_ts: u64,
    /// True until the first update, to avoid a spurious stale mark.
    init_ts: bool,
}

/// The loaded table plus the EEPROM node it commits into.
pub struct SmbusTarget {
    records: HashMap<String, SensorRecord>,
    stale_threshold_ms: u64,
    slave_version: i64,
    eeprom_path: PathBuf,
}

fn parse_hex_u16(field: &str) -> Result<u16, SmbusError> {
    let digits = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")).unwrap_or(field);
    u16::from_str_radix(digits, 16).map_err(|_| SmbusError::InvalidConfigData {
        reason: format!("bad hex field: {field}"),
    })
}

impl SmbusTarget {
    /// Parse the CSV table and record the EEPROM node path.
    pub fn from_csv(csv_path: &Path, eeprom_path: &Path) -> Result<Self, SmbusError> {
        if !csv_path.exists() {
            error!(path = %csv_path.display(), "smbus telemetry config CSV not found");
            return Err(SmbusError::ConfigFileNotFound {
                path: csv_path.display().to_string(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(csv_path)
            .map_err(|e| SmbusError::InvalidConfigData {
                reason: e.to_string(),
            })?;

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SmbusError::InvalidConfigData {
                reason: e.to_string(),
            })?;
            rows.push(
                record
                    .iter()
                    .filter(|field| !field.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        Self::validate_layout(&rows)?;

        let slave_version =
            i64::from_str_radix(rows[0][1].trim_start_matches("0x"), 16).map_err(|_| {
                SmbusError::InvalidConfigData {
                    reason: format!("bad slave_version: {}", rows[0][1]),
                }
            })?;
        let stale_threshold_ms =
            rows[1][1]
                .parse::<u64>()
                .map_err(|_| SmbusError::InvalidConfigData {
                    reason: format!("bad staleness_threshold: {}", rows[1][1]),
                })?;

        let mut records = HashMap::new();
        for row in rows.iter().skip(3) {
            if row.len() != DATA_RECORD_FIELDS {
                error!(fields = row.len(), "invalid smbus sensor data record");
                return Err(SmbusError::InvalidConfigData {
                    reason: format!("record has {} fields, expected {DATA_RECORD_FIELDS}", row.len()),
                });
            }
            let record = SensorRecord {
                offset: parse_hex_u16(&row[0])?,
                length: row[1].parse().map_err(|_| SmbusError::InvalidConfigData {
                    reason: format!("bad length: {}", row[1]),
                })?,
                stale_offset: if row[6] == "NA" {
                    None
                } else {
                    Some(parse_hex_u16(&row[6])?)
                },
                stale_bit: if row[7] == "NA" {
                    None
                } else {
                    Some(row[7].parse().map_err(|_| SmbusError::InvalidConfigData {
                        reason: format!("bad stale_bit: {}", row[7]),
                    })?)
                },
                previous_ts: 0,
                init_ts: true,
            };
            let key = format!("{}_{}_{}", row[3], row[4], row[5]);
            records.insert(key, record);
        }

        info!(count = records.len(), "smbus sensor records configured");
        Ok(Self {
            records,
            stale_threshold_ms,
            slave_version,
            eeprom_path: eeprom_path.to_path_buf(),
        })
    }

    fn validate_layout(rows: &[Vec<String>]) -> Result<(), SmbusError> {
        let header_ok = rows.len() >= 3
            && rows[0].first().map(String::as_str) == Some("slave_version")
            && rows[1].first().map(String::as_str) == Some("staleness_threshold")
            && rows[2]
                == [
                    "offset",
                    "length",
                    "data_format",
                    "dbus_objectpath",
                    "dbus_interface",
                    "dbus_property",
                    "stale_offset",
                    "stale_bit",
                ];
        if !header_ok {
            error!("invalid record layout in smbus csv file");
            return Err(SmbusError::InvalidConfigData {
                reason: "header records malformed".to_string(),
            });
        }
        Ok(())
    }

    /// Slave protocol version from the table header.
    pub fn slave_version(&self) -> i64 {
        self.slave_version
    }

    /// Number of configured sensor records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Commit one telemetry refresh.
    ///
    /// Unknown keys succeed silently (not every sensor is mapped onto the
    /// SMBus target). A non-zero `rc` commits an `0xFF` fill and forces
    /// the stale bit; otherwise staleness is elapsed-time-since-previous
    /// exceeding the configured threshold.
    pub fn update(
        &mut self,
        device_path: &str,
        interface: &str,
        property: &str,
        data: &[u8],
        ts_ms: u64,
        rc: i32,
    ) -> Result<(), SmbusError> {
        let key = format!("{device_path}_{interface}_{property}");
        let Some(record) = self.records.get_mut(&key) else {
            return Ok(());
        };

        let mut eeprom = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.eeprom_path)
            .map_err(|_| {
                error!(path = %self.eeprom_path.display(), "smbus eeprom file not found");
                SmbusError::SysfsPathNotFound {
                    path: self.eeprom_path.display().to_string(),
                }
            })?;

        // First refresh seeds the timestamp so it cannot read as stale.
        if record.init_ts {
            record.previous_ts = ts_ms;
            record.init_ts = false;
        }
        let mut stale = ts_ms.saturating_sub(record.previous_ts) > self.stale_threshold_ms;
        record.previous_ts = ts_ms;

        let fill;
        let payload = if rc == 0 {
            data
        } else {
            stale = true;
            fill = vec![0xFFu8; record.length];
            &fill[..]
        };

        eeprom.seek(SeekFrom::Start(record.offset as u64))?;
        eeprom.write_all(&payload[..record.length.min(payload.len())])?;

        if let (Some(stale_offset), Some(stale_bit)) = (record.stale_offset, record.stale_bit) {
            let mut current = [0u8; 1];
            eeprom.seek(SeekFrom::Start(stale_offset as u64))?;
            eeprom.read_exact(&mut current)?;
            if stale {
                current[0] |= 1 << stale_bit;
            } else {
                current[0] &= !(1 << stale_bit);
            }
            eeprom.seek(SeekFrom::Start(stale_offset as u64))?;
            eeprom.write_all(&current)?;
        }
        Ok(())
    }
}

static TARGET: Mutex<Option<SmbusTarget>> = Mutex::new(None);

/// Initialize the process-global SMBus target from the deployment paths
/// (honoring the environment overrides). Callable from the producer's
/// init path; returns `false` on any load failure.
pub fn init() -> bool {
    let csv_path =
        std::env::var(SMBUS_CSV_ENV).unwrap_or_else(|_| SMBUS_CSV_PATH.to_string());
    let eeprom_path =
        std::env::var(SMBUS_EEPROM_ENV).unwrap_or_else(|_| SMBUS_EEPROM_PATH.to_string());
    match SmbusTarget::from_csv(Path::new(&csv_path), Path::new(&eeprom_path)) {
        Ok(target) => {
            let mut slot = TARGET.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(target);
            true
        }
        Err(e) => {
            error!(error = %e, "smbus target init failed");
            false
        }
    }
}

/// Commit one telemetry refresh through the process-global target.
/// Returns `false` when [`init`] has not succeeded or the commit failed.
pub fn update_smbus_telemetry(
    device_path: &str,
    interface: &str,
    property: &str,
    data: &[u8],
    ts_ms: u64,
    rc: i32,
) -> bool {
    let mut slot = TARGET.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let Some(target) = slot.as_mut() else {
        return false;
    };
    match target.update(device_path, interface, property, data, ts_ms, rc) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "smbus telemetry update failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    const CSV: &str = "\
slave_version,0x01
staleness_threshold,5000
offset,length,data_format,dbus_objectpath,dbus_interface,dbus_property,stale_offset,stale_bit
0x10,4,float,/xyz/openbmc_project/sensors/temperature/T0,xyz.openbmc_project.Sensor.Value,Value,0x80,2
0x20,2,uint16,/xyz/openbmc_project/sensors/power/P0,xyz.openbmc_project.Sensor.Value,Value,NA,NA
";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn eeprom_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 256]).unwrap();
        file.flush().unwrap();
        file
    }

    fn read_eeprom(file: &NamedTempFile) -> Vec<u8> {
        std::fs::read(file.path()).unwrap()
    }

    #[test]
    fn loads_valid_table() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();
        assert_eq!(target.record_count(), 2);
        assert_eq!(target.slave_version(), 1);
    }

    #[test]
    fn missing_csv_fails() {
        let eeprom = eeprom_file();
        let result = SmbusTarget::from_csv(Path::new("/nonexistent.csv"), eeprom.path());
        assert!(matches!(result, Err(SmbusError::ConfigFileNotFound { .. })));
    }

    #[test]
    fn malformed_headers_fail() {
        let csv = write_csv("version,0x01\nthreshold,5\noffset,length\n");
        let eeprom = eeprom_file();
        let result = SmbusTarget::from_csv(csv.path(), eeprom.path());
        assert!(matches!(result, Err(SmbusError::InvalidConfigData { .. })));
    }

    #[test]
    fn short_data_record_fails() {
        let csv = write_csv(
            "slave_version,0x01\nstaleness_threshold,5000\noffset,length,data_format,dbus_objectpath,dbus_interface,dbus_property,stale_offset,stale_bit\n0x10,4,float,/p,i\n",
        );
        let eeprom = eeprom_file();
        let result = SmbusTarget::from_csv(csv.path(), eeprom.path());
        assert!(matches!(result, Err(SmbusError::InvalidConfigData { .. })));
    }

    #[test]
    fn update_commits_bytes_at_offset() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let mut target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();

        target
            .update(
                "/xyz/openbmc_project/sensors/temperature/T0",
                "xyz.openbmc_project.Sensor.Value",
                "Value",
                &[0xAA, 0xBB, 0xCC, 0xDD],
                1000,
                0,
            )
            .unwrap();

        let contents = read_eeprom(&eeprom);
        assert_eq!(&contents[0x10..0x14], &[0xAA, 0xBB, 0xCC, 0xDD]);
        // Fresh update: stale bit clear.
        assert_eq!(contents[0x80] & (1 << 2), 0);
    }

    #[test]
    fn update_truncates_to_record_length() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let mut target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();

        target
            .update(
                "/xyz/openbmc_project/sensors/temperature/T0",
                "xyz.openbmc_project.Sensor.Value",
                "Value",
                &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
                1000,
                0,
            )
            .unwrap();

        let contents = read_eeprom(&eeprom);
        assert_eq!(&contents[0x10..0x14], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(contents[0x14], 0);
    }

    #[test]
    fn stale_threshold_sets_and_clears_bit() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let mut target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();
        let path = "/xyz/openbmc_project/sensors/temperature/T0";
        let iface = "xyz.openbmc_project.Sensor.Value";

        // First update seeds the timestamp; never stale.
        target.update(path, iface, "Value", &[1, 2, 3, 4], 10_000, 0).unwrap();
        assert_eq!(read_eeprom(&eeprom)[0x80] & (1 << 2), 0);

        // Gap above the 5000 ms threshold marks the record stale.
        target.update(path, iface, "Value", &[1, 2, 3, 4], 20_000, 0).unwrap();
        assert_ne!(read_eeprom(&eeprom)[0x80] & (1 << 2), 0);

        // A prompt refresh clears it again.
        target.update(path, iface, "Value", &[1, 2, 3, 4], 21_000, 0).unwrap();
        assert_eq!(read_eeprom(&eeprom)[0x80] & (1 << 2), 0);
    }

    #[test]
    fn failed_reading_commits_ff_fill_and_stale() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let mut target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();
        let path = "/xyz/openbmc_project/sensors/temperature/T0";
        let iface = "xyz.openbmc_project.Sensor.Value";

        target.update(path, iface, "Value", &[1, 2, 3, 4], 1_000, 0).unwrap();
        target.update(path, iface, "Value", &[5, 6, 7, 8], 1_500, -1).unwrap();

        let contents = read_eeprom(&eeprom);
        assert_eq!(&contents[0x10..0x14], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_ne!(contents[0x80] & (1 << 2), 0);
    }

    #[test]
    fn record_without_stale_fields_skips_rmw() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let mut target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();

        target
            .update(
                "/xyz/openbmc_project/sensors/power/P0",
                "xyz.openbmc_project.Sensor.Value",
                "Value",
                &[0x12, 0x34],
                1_000,
                0,
            )
            .unwrap();

        let contents = read_eeprom(&eeprom);
        assert_eq!(&contents[0x20..0x22], &[0x12, 0x34]);
    }

    #[test]
    fn unknown_key_is_silently_ignored() {
        let csv = write_csv(CSV);
        let eeprom = eeprom_file();
        let mut target = SmbusTarget::from_csv(csv.path(), eeprom.path()).unwrap();
        assert!(target
            .update("/unmapped/path", "iface", "Prop", &[1], 1_000, 0)
            .is_ok());
    }
}
