//! # MRD Shared-Memory Sensor Map Engine
//!
//! Cross-process telemetry publishing for a BMC-class platform. Producer
//! processes write sensor records into named POSIX shared-memory segments;
//! consumer processes (the metric report service, tooling) open the same
//! segments read-only and take consistent snapshots without bus
//! round-trips.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────────────┐    ┌──────────────┐
//! │ Producer     │    │ /dev/shm/<producer>_<ns>  │    │ Consumer     │
//! │              │    │ ┌───────────┬───────────┐ │    │              │
//! │ SensorStore  ├───►│ │ header +  │ sensor    │ ├───►│ SensorMap::  │
//! │  SensorMap   │    │ │ allocator │ map       │ │    │  readonly()  │
//! └──────────────┘    │ └───────────┴───────────┘ │    └──────────────┘
//!                     │ <name>lock: rw-mutex      │
//!                     └───────────────────────────┘
//! ```
//!
//! Each segment pairs with a co-named cross-process reader/writer lock.
//! Writers hold the exclusive side for every mutation; readers take the
//! shared side with a bounded 1 s wait and surface
//! [`ShmError::LockTimeout`] instead of falling back to a stale read.
//!
//! ## Usage
//!
//! ```no_run
//! use mrd_shmem::{SensorMap, SensorValue};
//!
//! # fn main() -> Result<(), mrd_shmem::ShmError> {
//! // Producer
//! let map = SensorMap::with_create("gpumgrd_HGX_ProcessorMetrics_0", 1024 * 1000, 256)?;
//! let value = SensorValue::new(
//!     "19.062500",
//!     "/redfish/v1/Chassis/HGX_Chassis_0/Sensors/HGX_Chassis_0_HSC_0_Temp_0",
//!     23140448,
//!     "1970-01-01T06:25:40.448+00:00",
//! );
//! map.insert("sensor-key", &value)?;
//!
//! // Consumer
//! let reader = SensorMap::readonly("gpumgrd_HGX_ProcessorMetrics_0")?;
//! let all = reader.get_all()?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod lock;
pub mod map;
pub mod segment;
pub mod store;
pub mod value;

pub use error::{ShmError, ShmResult};
pub use lock::{ShmReadGuard, ShmRwLock, ShmWriteGuard};
pub use map::{SensorMap, MAP_SUFFIX, READ_LOCK_TIMEOUT};
pub use segment::{AccessMode, Segment, LOCK_SUFFIX};
pub use store::SensorStore;
pub use value::SensorValue;
