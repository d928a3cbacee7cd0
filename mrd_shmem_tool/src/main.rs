//! # MRD Shared-Memory Diagnostic Tool
//!
//! Inspect and exercise sensor map segments from the command line:
//!
//! - `read` — open read-only and dump every record
//! - `readraw` — dump raw (key, value) pairs
//! - `erase` — create (or reset) the segment and clear the map
//! - `create` — populate synthetic records, then sleep for readers
//! - `perf` — hot insert/lookup loop with latency traces
//! - `stat` — poll and dump continuously

use clap::{Parser, Subcommand};
use mrd_shmem::{SensorMap, SensorValue, ShmResult};
use std::time::{Duration, Instant};
use tracing::{error, info};

const TOOL_SEGMENT_BYTES: usize = 1024 * 1000;
const SYNTHETIC_RECORDS: usize = 1000;
const PERF_RECORDS: usize = 5000;

#[derive(Parser)]
#[command(name = "mrd-shmem-tool", about = "MRD shared-memory sensor map diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a segment read-only and dump its records.
    Read {
        /// Segment name, e.g. gpumgrd_HGX_PlatformEnvironmentMetrics_0
        segment: String,
    },
    /// Dump raw (key, value) pairs of a segment.
    Readraw {
        /// Segment name.
        segment: String,
    },
    /// Create (or reset) a segment and clear its map.
    Erase {
        /// Segment name.
        segment: String,
    },
    /// Populate a segment with synthetic records and sleep for readers.
    Create {
        /// Segment name.
        segment: String,
    },
    /// Hot insert/lookup loop against a fresh segment.
    Perf {
        /// Segment name.
        segment: String,
    },
    /// Poll a segment and dump its records once a second.
    Stat {
        /// Segment name.
        segment: String,
    },
}

fn dump_records(map: &SensorMap) -> ShmResult<()> {
    for value in map.get_all()? {
        info!(
            resource = %value.resource_pointer,
            iso = %value.timestamp_iso,
            ts_ms = value.timestamp_ms,
            reading = %value.reading,
            "sensor"
        );
    }
    Ok(())
}

fn synthetic_value(index: usize, ts_ms: u64) -> SensorValue {
    SensorValue::new(
        index.to_string(),
        format!("/redfish/v1/HGX_Chassis_0/Sensors/Sensor_{index}"),
        ts_ms,
        "1970-01-01T00:00:00.000+00:00",
    )
}

/// Cheap deterministic index sequence for the synthetic workloads.
fn pseudo_index(step: usize, modulus: usize) -> usize {
    step.wrapping_mul(2_654_435_761) % modulus
}

fn run(command: Command) -> ShmResult<()> {
    match command {
        Command::Read { segment } => {
            let map = SensorMap::readonly(&segment)?;
            info!(%segment, "segment opened (read-only)");
            info!(free_bytes = map.free_bytes(), "segment free space");
            dump_records(&map)?;
        }
        Command::Readraw { segment } => {
            let map = SensorMap::readonly(&segment)?;
            info!(%segment, "segment opened (read-only)");
            for (key, value) in map.get_all_pairs()? {
                info!(key = %key, reading = %value.reading, ts_ms = value.timestamp_ms, "entry");
            }
        }
        Command::Erase { segment } => {
            let map = SensorMap::with_create(&segment, TOOL_SEGMENT_BYTES, SYNTHETIC_RECORDS)?;
            info!(%segment, "segment created");
            map.clear()?;
            info!(%segment, "segment erase done");
        }
        Command::Create { segment } => {
            let map = SensorMap::with_create(&segment, TOOL_SEGMENT_BYTES, SYNTHETIC_RECORDS)?;
            info!(%segment, "segment created");
            for step in 0..SYNTHETIC_RECORDS {
                let index = pseudo_index(step, SYNTHETIC_RECORDS);
                let key = format!("HGX_Chassis_0_My_Sensor_{index}");
                map.insert(&key, &synthetic_value(index, step as u64))?;
            }
            info!(count = map.size(), "objects inserted");
            // Hold the segment open so other processes can read it.
            loop {
                std::thread::sleep(Duration::from_secs(100));
            }
        }
        Command::Perf { segment } => {
            let map = SensorMap::with_create(&segment, 4 * TOOL_SEGMENT_BYTES, PERF_RECORDS)?;
            info!(%segment, "segment created");
            for step in 0..PERF_RECORDS {
                let index = pseudo_index(step, PERF_RECORDS);
                let key = format!("HGX_Chassis_0_My_Sensor_{index}");
                map.insert(&key, &synthetic_value(index, 0))?;
            }
            info!(count = map.size(), "objects inserted");

            let mut step = 0usize;
            loop {
                let index = pseudo_index(step, PERF_RECORDS);
                let key = format!("HGX_Chassis_0_My_Sensor_{index}");
                step = step.wrapping_add(1);

                let start = Instant::now();
                match map.get(&key)? {
                    Some(value) => info!(
                        us = start.elapsed().as_micros() as u64,
                        reading = %value.reading,
                        "key found"
                    ),
                    None => info!(key = %key, "key not found"),
                }

                let start = Instant::now();
                map.insert(&key, &synthetic_value(index, step as u64))?;
                info!(us = start.elapsed().as_micros() as u64, "update done");

                std::thread::sleep(Duration::from_millis(10));
            }
        }
        Command::Stat { segment } => {
            let map = SensorMap::readonly(&segment)?;
            info!(%segment, "segment opened (read-only)");
            loop {
                dump_records(&map)?;
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt().compact().init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return std::process::ExitCode::from(1);
        }
    };
    match run(cli.command) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "tool command failed");
            std::process::ExitCode::from(2)
        }
    }
}
