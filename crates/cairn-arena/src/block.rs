//! Block codec: per-allocation metadata stored inside each block.
//!
//! See [`cairn_core::layout`] for the byte layout. Encoding always writes
//! both guards; validation only runs when debug assertions are enabled.

use std::ptr::NonNull;

use cairn_core::layout::{
    usable_size, ALLOC_FILL, GUARD_MAGIC, MIN_BLOCK_SIZE, PAYLOAD_ALIGN, PAYLOAD_OFFSET,
};
use cairn_core::{Corruption, HeapError, MisuseKind};

use crate::chunk::Chunk;
use crate::free_list::FreeList;
use crate::raw;

/// The raw extent of one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockExtent {
    pub start: NonNull<u8>,
    pub size: usize,
}

impl BlockExtent {
    pub fn start_addr(&self) -> usize {
        self.start.as_ptr() as usize
    }

    pub fn usable(&self) -> usize {
        usable_size(self.size)
    }
}

/// Turn `start..start + size` into a live block and return its payload.
///
/// With debug assertions the payload is filled with [`ALLOC_FILL`].
///
/// # Safety
///
/// The range must be unused memory inside one chunk, aligned to
/// [`MIN_BLOCK_SIZE`], with `size` a power of two no smaller than it.
#[allow(unsafe_code)]
pub(crate) unsafe fn prepare(start: NonNull<u8>, size: usize) -> NonNull<u8> {
    debug_assert!(size.is_power_of_two() && size >= MIN_BLOCK_SIZE);
    debug_assert_eq!(start.as_ptr() as usize % MIN_BLOCK_SIZE, 0);
    // SAFETY: forwarded from the caller.
    unsafe {
        let payload = raw::encode_block(start, size);
        if cfg!(debug_assertions) {
            raw::fill(payload, usable_size(size), ALLOC_FILL);
        }
        payload
    }
}

/// Recover the block extent from a payload pointer without checking it.
///
/// # Safety
///
/// `payload` must have been returned by [`prepare`] and still be live.
#[allow(unsafe_code)]
pub(crate) unsafe fn decode(payload: NonNull<u8>) -> BlockExtent {
    // SAFETY: forwarded from the caller.
    let (start, size) = unsafe { raw::decode_block(payload) };
    BlockExtent {
        start,
        size: size as usize,
    }
}

/// Decode a payload pointer and check every invariant of its block.
///
/// `owner` is the chunk whose handed-out range contains `payload`, or
/// `None` if no chunk does. Every read stays inside `owner`, so a corrupt
/// header can never send validation out of bounds. A block whose start is
/// already covered by `free` is reported as a double release before its
/// (overwritten) guards are looked at.
#[allow(unsafe_code)]
pub(crate) fn validate(
    payload: NonNull<u8>,
    owner: Option<&Chunk>,
    free: &FreeList,
) -> Result<BlockExtent, HeapError> {
    let address = payload.as_ptr() as usize;
    let foreign = HeapError::Misuse {
        address,
        kind: MisuseKind::ForeignPointer,
    };
    let Some(chunk) = owner else {
        return Err(foreign);
    };
    let base = chunk.base_addr();
    let handed_out_end = base + chunk.used();
    // A payload always sits PAYLOAD_OFFSET past a MIN_BLOCK_SIZE-aligned start.
    if address % PAYLOAD_ALIGN != 0
        || address < base + PAYLOAD_OFFSET
        || (address - PAYLOAD_OFFSET - base) % MIN_BLOCK_SIZE != 0
    {
        return Err(foreign);
    }
    if free.covers(address - PAYLOAD_OFFSET) {
        return Err(HeapError::Misuse {
            address,
            kind: MisuseKind::DoubleRelease,
        });
    }

    // Only the first MIN_BLOCK_SIZE bytes are known to be in bounds here.
    // SAFETY: the block start is a MIN_BLOCK_SIZE boundary below the
    // chunk's handed-out end, which is itself such a boundary.
    let (extent, leading) = unsafe {
        let extent = decode(payload);
        (extent, raw::read_guards(extent.start, MIN_BLOCK_SIZE).0)
    };
    if leading != GUARD_MAGIC {
        return Err(HeapError::CorruptionDetected {
            address,
            kind: Corruption::LeadingGuard { found: leading },
        });
    }

    let size = extent.size;
    if !size.is_power_of_two()
        || size < MIN_BLOCK_SIZE
        || extent.start_addr().checked_add(size).is_none_or(|end| end > handed_out_end)
    {
        return Err(HeapError::CorruptionDetected {
            address,
            kind: Corruption::Header { size: size as u32 },
        });
    }

    // SAFETY: the full block is inside the chunk (checked above).
    let (_, trailing) = unsafe { raw::read_guards(extent.start, size) };
    if trailing != GUARD_MAGIC {
        return Err(HeapError::CorruptionDetected {
            address,
            kind: Corruption::TrailingGuard { found: trailing },
        });
    }
    Ok(extent)
}
