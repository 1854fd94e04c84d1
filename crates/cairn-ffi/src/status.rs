//! C-compatible status codes.
//!
//! [`CairnStatus`] is a `repr(i32)` enum covering every error condition a
//! heap entry point can report. Conversions from [`HeapError`] and
//! [`ConfigError`] are provided.

use cairn_core::{ConfigError, HeapError};

/// C-compatible status code returned by every fallible FFI function.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CairnStatus {
    /// Success.
    Ok = 0,
    /// Heap pointer is null.
    InvalidHandle = -1,
    /// An argument is null, out of range, or otherwise invalid.
    InvalidArgument = -2,
    /// Configuration validation error.
    ConfigError = -3,
    /// The chunk source could not supply a chunk.
    OutOfMemory = -4,
    /// A single request can never fit in a chunk.
    RequestTooLarge = -5,
    /// A block guard or header was overwritten.
    CorruptionDetected = -6,
    /// Foreign pointer or double release.
    Misuse = -7,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&HeapError> for CairnStatus {
    fn from(e: &HeapError) -> Self {
        match e {
            HeapError::OutOfMemory { .. } => CairnStatus::OutOfMemory,
            HeapError::RequestTooLarge { .. } => CairnStatus::RequestTooLarge,
            HeapError::CorruptionDetected { .. } => CairnStatus::CorruptionDetected,
            HeapError::Misuse { .. } => CairnStatus::Misuse,
        }
    }
}

impl From<&ConfigError> for CairnStatus {
    fn from(_e: &ConfigError) -> Self {
        CairnStatus::ConfigError
    }
}
