//! Error types for shared-memory map operations

use thiserror::Error;

/// Errors that can occur while operating on a shared-memory sensor map.
#[derive(Debug, Error)]
pub enum ShmError {
    /// Segment or its lock object does not exist in `/dev/shm`.
    #[error("segment not found: '{segment}'")]
    NotFound {
        /// Segment name.
        segment: String,
    },

    /// Write operation attempted through a read-only handle.
    ///
    /// This is a programming error on the caller's side, not a runtime
    /// condition to recover from.
    #[error("permission denied: '{segment}' was opened read-only")]
    PermissionDenied {
        /// Segment name.
        segment: String,
    },

    /// Shared read lock could not be acquired within the bounded wait.
    #[error("failed to acquire the read lock on '{segment}' within {timeout_ms} ms")]
    LockTimeout {
        /// Segment name.
        segment: String,
        /// Bounded wait that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The in-segment map object is missing at its well-known name.
    #[error("map object not found in segment '{segment}'")]
    BadMap {
        /// Segment name.
        segment: String,
    },

    /// The segment allocator ran out of free space.
    #[error("segment '{segment}' out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Segment name.
        segment: String,
        /// Allocation request that failed.
        requested: usize,
    },

    /// Segment content failed validation (wrong magic or truncated).
    #[error("segment '{segment}' is not a valid sensor map segment")]
    InvalidSegment {
        /// Segment name.
        segment: String,
    },

    /// OS-level error from nix/libc calls.
    #[error("OS error on '{segment}': {source}")]
    Os {
        /// Segment name.
        segment: String,
        /// Underlying errno.
        source: nix::errno::Errno,
    },

    /// IO error while mapping the segment.
    #[error("IO error on '{segment}': {source}")]
    Io {
        /// Segment name.
        segment: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Result type for shared-memory map operations.
pub type ShmResult<T> = Result<T, ShmError>;
