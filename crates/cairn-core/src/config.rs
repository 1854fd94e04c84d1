//! Heap configuration parameters.

use crate::error::ConfigError;
use crate::layout::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Configuration for a script heap.
///
/// Fixed for the heap's lifetime: validated once at construction and
/// never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Size of every chunk requested from the chunk source, in bytes.
    ///
    /// Default: 5 MiB. Must be a multiple of
    /// [`MIN_BLOCK_SIZE`](crate::layout::MIN_BLOCK_SIZE) and no larger than
    /// [`MAX_BLOCK_SIZE`](crate::layout::MAX_BLOCK_SIZE). A chunk bounds the
    /// largest single allocation to the biggest power of two it can hold.
    pub chunk_size: usize,
}

impl HeapConfig {
    /// Default chunk size: 5 MiB.
    pub const DEFAULT_CHUNK_SIZE: usize = 0x50_0000;

    /// Create a config with the given chunk size.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < MIN_BLOCK_SIZE {
            return Err(ConfigError::ChunkTooSmall {
                configured: self.chunk_size,
                minimum: MIN_BLOCK_SIZE,
            });
        }
        if self.chunk_size % MIN_BLOCK_SIZE != 0 {
            return Err(ConfigError::ChunkMisaligned {
                configured: self.chunk_size,
                granule: MIN_BLOCK_SIZE,
            });
        }
        if self.chunk_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::ChunkTooLarge {
                configured: self.chunk_size,
                maximum: MAX_BLOCK_SIZE,
            });
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHUNK_SIZE)
    }
}
