//! # MRD Telemetry Aggregation
//!
//! The telemetry layer over the [`mrd_shmem`] map engine. Producer
//! processes feed bus property updates into [`producer::update_telemetry`];
//! the aggregator classifies each (device path, interface, property)
//! triple into sensor namespaces, translates and expands the payload, and
//! drives the shared-memory store. The metric report service consumes
//! snapshots through [`client::get_all_values`].
//!
//! ## Producer side
//!
//! ```no_run
//! use mrd_telemetry::{producer, PayloadValue};
//!
//! assert!(producer::init("gpumgrd"));
//! producer::update_telemetry(
//!     "/xyz/openbmc_project/sensors/temperature/HGX_Chassis_0_HSC_0_Temp_0",
//!     "xyz.openbmc_project.Sensor.Value",
//!     "Value",
//!     &PayloadValue::Double(19.0625),
//!     23140448,
//!     0,
//!     "HGX_Chassis_0",
//! );
//! ```
//!
//! ## Consumer side
//!
//! ```no_run
//! let values = mrd_telemetry::client::get_all_values("HGX_PlatformEnvironmentMetrics_0")?;
//! for value in values {
//!     println!("{}: {}", value.resource_pointer, value.reading);
//! }
//! # Ok::<(), mrd_telemetry::TelemetryError>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod log_limit;
pub mod payload;
pub mod producer;
pub mod time;
pub mod translate;

pub use aggregator::{Classification, SensorAggregator};
pub use config::{NamespaceConfig, ShmConfig};
pub use error::{TelemetryError, TelemetryResult};
pub use mrd_shmem::SensorValue;
pub use payload::PayloadValue;
