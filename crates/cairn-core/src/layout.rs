//! In-memory block layout.
//!
//! Every live allocation occupies one block:
//!
//! ```text
//!  raw start                                              raw start + size
//!  │                                                                     │
//!  ▼                                                                     ▼
//!  ┌──────────┬──────────┬─────────────────────────────────┬──────────┐
//!  │ guard u32│ size u32 │ payload (+ rounding slack)      │ guard u32│
//!  └──────────┴──────────┴─────────────────────────────────┴──────────┘
//!                         ▲
//!                         └── pointer handed to the script runtime
//! ```
//!
//! Block sizes are powers of two, never smaller than [`MIN_BLOCK_SIZE`].

/// Magic value written at both ends of every block.
pub const GUARD_MAGIC: u32 = 0xFECA_EFBE;

/// Width of one guard marker in bytes.
pub const GUARD_BYTES: usize = 4;

/// Width of the size header in bytes.
pub const HEADER_BYTES: usize = 4;

/// Offset from the raw block start to the payload.
pub const PAYLOAD_OFFSET: usize = GUARD_BYTES + HEADER_BYTES;

/// Bytes of every block that are not usable payload.
pub const BLOCK_OVERHEAD: usize = 2 * GUARD_BYTES + HEADER_BYTES;

/// Smallest block the heap hands out.
///
/// Also the granule of every chunk and free range: a freed block of this
/// size must be able to host a free-list node.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Largest block the `u32` size header can describe.
pub const MAX_BLOCK_SIZE: usize = 1 << 31;

/// Alignment guaranteed for every payload pointer.
pub const PAYLOAD_ALIGN: usize = 8;

/// Fill byte for freshly allocated payloads (debug builds).
pub const ALLOC_FILL: u8 = 0xA5;

/// Fill byte for released blocks (debug builds).
pub const FREE_FILL: u8 = 0xEE;

/// Full block size needed to host `requested` payload bytes.
///
/// Returns `None` if the result would overflow or exceed
/// [`MAX_BLOCK_SIZE`].
pub fn block_size_for(requested: usize) -> Option<usize> {
    let raw = requested.checked_add(BLOCK_OVERHEAD)?;
    let size = raw.checked_next_power_of_two()?.max(MIN_BLOCK_SIZE);
    (size <= MAX_BLOCK_SIZE).then_some(size)
}

/// Payload bytes available in a block of `block_size` bytes.
pub fn usable_size(block_size: usize) -> usize {
    block_size.saturating_sub(BLOCK_OVERHEAD)
}

/// Largest power-of-two block that fits inside a chunk of `chunk_size` bytes.
pub fn largest_block_in(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    let floor = 1usize << (usize::BITS - 1 - chunk_size.leading_zeros());
    floor.min(MAX_BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_requests_round_to_minimum_block() {
        assert_eq!(block_size_for(0), Some(16));
        assert_eq!(block_size_for(4), Some(16));
    }

    #[test]
    fn overhead_pushes_to_next_power_of_two() {
        assert_eq!(block_size_for(5), Some(32));
        assert_eq!(block_size_for(20), Some(32));
        assert_eq!(block_size_for(21), Some(64));
        assert_eq!(block_size_for(500), Some(512));
        assert_eq!(block_size_for(501), Some(1024));
    }

    #[test]
    fn oversized_requests_are_rejected() {
        assert_eq!(block_size_for(usize::MAX), None);
        assert_eq!(block_size_for(MAX_BLOCK_SIZE), None);
        assert_eq!(
            block_size_for(MAX_BLOCK_SIZE - BLOCK_OVERHEAD),
            Some(MAX_BLOCK_SIZE)
        );
    }

    #[test]
    fn usable_size_excludes_overhead() {
        assert_eq!(usable_size(16), 4);
        assert_eq!(usable_size(512), 500);
    }

    #[test]
    fn largest_block_rounds_down() {
        assert_eq!(largest_block_in(1024), 1024);
        assert_eq!(largest_block_in(0x50_0000), 0x40_0000);
        assert_eq!(largest_block_in(48), 32);
        assert_eq!(largest_block_in(0), 0);
    }

    #[test]
    fn payload_offset_keeps_alignment() {
        assert_eq!(MIN_BLOCK_SIZE % PAYLOAD_ALIGN, 0);
        assert_eq!(PAYLOAD_OFFSET % PAYLOAD_ALIGN, 0);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn block_always_hosts_request(requested in 0usize..(1 << 24)) {
                let size = block_size_for(requested).unwrap();
                prop_assert!(size.is_power_of_two());
                prop_assert!(size >= MIN_BLOCK_SIZE);
                prop_assert!(usable_size(size) >= requested);
                // Never more than double the tight fit.
                prop_assert!(size < 2 * (requested + BLOCK_OVERHEAD).max(MIN_BLOCK_SIZE));
            }
        }
    }
}
