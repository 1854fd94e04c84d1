//! Error types for the Cairn script heap.
//!
//! [`HeapError`] covers the per-call failures of allocate/resize/release;
//! [`ConfigError`] covers construction-time validation. None of these
//! conditions is transient, so nothing in the heap retries.

use std::error::Error;
use std::fmt;

/// Errors returned by heap operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// The chunk source could not supply a new chunk.
    ///
    /// Fatal for the in-flight request; the embedding runtime usually
    /// aborts the script operation that triggered it.
    OutOfMemory {
        /// Block size (in bytes) of the request that forced chunk growth.
        requested: usize,
        /// Size of the chunk the source failed to provide.
        chunk_size: usize,
    },
    /// A single block for this request could never fit in one chunk.
    RequestTooLarge {
        /// Payload bytes requested by the caller.
        requested: usize,
        /// Largest block a chunk of the configured size can hold.
        max_block: usize,
    },
    /// A guard marker or size header no longer holds its expected value.
    ///
    /// Detected only in builds with debug assertions. Indicates an overrun,
    /// a stray write, or a use-after-free elsewhere in the host program.
    CorruptionDetected {
        /// Payload address of the block being validated.
        address: usize,
        /// Which part of the block was damaged.
        kind: Corruption,
    },
    /// The caller handed the heap a pointer it cannot legally accept.
    ///
    /// Undefined behaviour in release builds; detected with debug assertions.
    Misuse {
        /// The offending payload address.
        address: usize,
        /// What the caller did wrong.
        kind: MisuseKind,
    },
}

/// The damaged part of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corruption {
    /// The guard word before the size header was overwritten.
    LeadingGuard {
        /// Value found where the guard should be.
        found: u32,
    },
    /// The guard word at the end of the block was overwritten.
    TrailingGuard {
        /// Value found where the guard should be.
        found: u32,
    },
    /// The size header is not a valid block size for its chunk.
    Header {
        /// Value found in the header.
        size: u32,
    },
}

/// Ways a caller can misuse the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MisuseKind {
    /// The pointer does not lie inside any chunk owned by this heap.
    ForeignPointer,
    /// The pointer lies inside a range that is already free.
    DoubleRelease,
}

impl HeapError {
    /// Whether the error means the heap can no longer be trusted.
    ///
    /// Exhaustion and oversized requests leave the heap consistent and are
    /// reported to the runtime as a null pointer. Corruption and misuse are
    /// not recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CorruptionDetected { .. } | Self::Misuse { .. })
    }
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                chunk_size,
            } => {
                write!(
                    f,
                    "out of memory: could not acquire a {chunk_size}-byte chunk \
                     for a {requested}-byte block"
                )
            }
            Self::RequestTooLarge {
                requested,
                max_block,
            } => {
                write!(
                    f,
                    "request of {requested} bytes exceeds the largest block of {max_block} bytes"
                )
            }
            Self::CorruptionDetected { address, kind } => {
                write!(f, "heap corruption at {address:#x}: {kind}")
            }
            Self::Misuse { address, kind } => {
                write!(f, "heap misuse at {address:#x}: {kind}")
            }
        }
    }
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeadingGuard { found } => write!(f, "leading guard overwritten ({found:#010x})"),
            Self::TrailingGuard { found } => {
                write!(f, "trailing guard overwritten ({found:#010x})")
            }
            Self::Header { size } => write!(f, "invalid block size header ({size})"),
        }
    }
}

impl fmt::Display for MisuseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignPointer => write!(f, "pointer was not issued by this heap"),
            Self::DoubleRelease => write!(f, "block released twice"),
        }
    }
}

impl Error for HeapError {}

/// Errors detected by [`HeapConfig::validate()`](crate::HeapConfig::validate).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The chunk cannot hold even one minimum-size block.
    ChunkTooSmall {
        /// The configured chunk size.
        configured: usize,
        /// The smallest acceptable chunk size.
        minimum: usize,
    },
    /// The chunk size is not a multiple of the minimum block size.
    ChunkMisaligned {
        /// The configured chunk size.
        configured: usize,
        /// The granule every chunk size must be a multiple of.
        granule: usize,
    },
    /// The chunk size cannot be described by a block size header.
    ChunkTooLarge {
        /// The configured chunk size.
        configured: usize,
        /// The largest acceptable chunk size.
        maximum: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkTooSmall {
                configured,
                minimum,
            } => write!(f, "chunk_size {configured} is below minimum of {minimum}"),
            Self::ChunkMisaligned {
                configured,
                granule,
            } => write!(f, "chunk_size {configured} is not a multiple of {granule}"),
            Self::ChunkTooLarge {
                configured,
                maximum,
            } => write!(f, "chunk_size {configured} exceeds maximum of {maximum}"),
        }
    }
}

impl Error for ConfigError {}
