//! Error taxonomy of the telemetry layer.

use thiserror::Error;

/// Errors surfaced by config loading and the consumer facade. The producer
/// hot path never raises; it logs (rate-limited) and returns `false`.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A config document is missing at its configured path.
    #[error("config file not found: {path}")]
    InvalidFilePath {
        /// Path that was probed.
        path: String,
    },

    /// A config document failed to parse or lacks a required top-level key.
    #[error("failed to parse config {path}: {reason}")]
    ConfigParse {
        /// Path of the offending document.
        path: String,
        /// Parser or shape diagnostic.
        reason: String,
    },

    /// Namespace or producer is not registered in the mapping document.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// Namespace or producer that was looked up.
        key: String,
    },

    /// Requested MRD namespace is absent from the consumer directory.
    #[error("namespace is not found in the MRD lookup: {namespace}")]
    NamespaceNotFound {
        /// Requested namespace stem.
        namespace: String,
    },

    /// Every producer segment for the namespace was empty or unreadable.
    #[error("namespace has no elements in shared memory: {namespace}")]
    NoElements {
        /// Requested namespace stem.
        namespace: String,
    },

    /// Error bubbled up from the shared-memory engine.
    #[error(transparent)]
    Shm(#[from] mrd_shmem::ShmError),
}

/// Result type of the telemetry layer.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
