//! Low-level primitives for heap memory operations.
//!
//! Every raw read and write the heap performs goes through this module:
//! chunk acquisition and release against the host allocator, block header
//! encode/decode, guard reads, and free-node encode/decode. Callers uphold
//! the contracts documented on each function; the rest of the crate works
//! with the safe wrappers in `block`, `chunk` and `free_list`.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

use cairn_core::layout::{GUARD_BYTES, GUARD_MAGIC, MIN_BLOCK_SIZE, PAYLOAD_OFFSET};

/// Intrusive node written over the first bytes of a free range.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub(crate) struct FreeNode {
    /// Full size of the free range in bytes.
    pub size: usize,
    /// Start of the next free range (strictly higher address).
    pub next: Option<NonNull<u8>>,
}

// Any block, even the smallest, must be able to host a node once freed.
const _: () = assert!(mem::size_of::<FreeNode>() <= MIN_BLOCK_SIZE);
const _: () = assert!(mem::align_of::<FreeNode>() <= MIN_BLOCK_SIZE);

fn region_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size, MIN_BLOCK_SIZE).ok()
}

/// Obtain a `size`-byte region from the global allocator, aligned to
/// [`MIN_BLOCK_SIZE`]. Returns `None` on failure or for a zero size.
pub(crate) fn alloc_region(size: usize) -> Option<NonNull<u8>> {
    if size == 0 {
        return None;
    }
    let layout = region_layout(size)?;
    // SAFETY: layout has a non-zero size.
    NonNull::new(unsafe { alloc::alloc(layout) })
}

/// Return a region obtained from [`alloc_region`].
///
/// # Safety
///
/// `base` must come from `alloc_region(size)` with the same `size` and
/// must not have been released already.
pub(crate) unsafe fn dealloc_region(base: NonNull<u8>, size: usize) {
    if let Some(layout) = region_layout(size) {
        // SAFETY: caller guarantees base/size match a live alloc_region call.
        unsafe { alloc::dealloc(base.as_ptr(), layout) };
    }
}

/// Write the guards and size header of a block; return its payload pointer.
///
/// # Safety
///
/// `start..start + size` must be writable memory inside one chunk, aligned
/// to [`MIN_BLOCK_SIZE`], with `size >= MIN_BLOCK_SIZE` and `size <= u32::MAX`.
pub(crate) unsafe fn encode_block(start: NonNull<u8>, size: usize) -> NonNull<u8> {
    let words = start.cast::<u32>().as_ptr();
    // SAFETY: the first 8 and last 4 bytes of the block are in bounds and
    // 4-byte aligned because start and size are multiples of MIN_BLOCK_SIZE.
    unsafe {
        words.write(GUARD_MAGIC);
        words.add(1).write(size as u32);
        start
            .as_ptr()
            .add(size - GUARD_BYTES)
            .cast::<u32>()
            .write(GUARD_MAGIC);
        start.add(PAYLOAD_OFFSET)
    }
}

/// Recover the raw block start and header size from a payload pointer.
///
/// # Safety
///
/// The 8 bytes before `payload` must be readable and 4-byte aligned.
pub(crate) unsafe fn decode_block(payload: NonNull<u8>) -> (NonNull<u8>, u32) {
    // SAFETY: caller guarantees the header words precede payload.
    unsafe {
        let start = payload.sub(PAYLOAD_OFFSET);
        let size = start.cast::<u32>().as_ptr().add(1).read();
        (start, size)
    }
}

/// Read the leading and trailing guard words of a block.
///
/// # Safety
///
/// `start..start + size` must be readable memory with `size >= MIN_BLOCK_SIZE`
/// and both ends 4-byte aligned.
pub(crate) unsafe fn read_guards(start: NonNull<u8>, size: usize) -> (u32, u32) {
    // SAFETY: both guard words lie inside the block per the caller contract.
    unsafe {
        let leading = start.cast::<u32>().as_ptr().read();
        let trailing = start
            .as_ptr()
            .add(size - GUARD_BYTES)
            .cast::<u32>()
            .read();
        (leading, trailing)
    }
}

/// Fill `len` bytes at `start` with `byte`.
///
/// # Safety
///
/// `start..start + len` must be writable and not referenced elsewhere.
pub(crate) unsafe fn fill(start: NonNull<u8>, len: usize, byte: u8) {
    // SAFETY: forwarded from the caller.
    unsafe { ptr::write_bytes(start.as_ptr(), byte, len) };
}

/// Copy `len` bytes between two non-overlapping payloads.
///
/// # Safety
///
/// Both ranges must be valid for `len` bytes and must not overlap.
pub(crate) unsafe fn copy_payload(src: NonNull<u8>, dst: NonNull<u8>, len: usize) {
    // SAFETY: forwarded from the caller.
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), len) };
}

/// Write a free-list node at the start of a free range.
///
/// # Safety
///
/// `start` must point at an unused range of at least `MIN_BLOCK_SIZE`
/// bytes, aligned to `MIN_BLOCK_SIZE`, inside a live chunk.
pub(crate) unsafe fn write_free_node(start: NonNull<u8>, node: FreeNode) {
    // SAFETY: forwarded from the caller; alignment is asserted above.
    unsafe { start.cast::<FreeNode>().as_ptr().write(node) };
}

/// Read the free-list node at the start of a free range.
///
/// # Safety
///
/// `start` must point at a node previously written by [`write_free_node`]
/// that has not been reused since.
pub(crate) unsafe fn read_free_node(start: NonNull<u8>) -> FreeNode {
    // SAFETY: forwarded from the caller.
    unsafe { start.cast::<FreeNode>().as_ptr().read() }
}

/// Advance a pointer by `offset` bytes inside the same chunk.
///
/// # Safety
///
/// `base + offset` must stay inside (or one past) the allocation `base`
/// belongs to.
pub(crate) unsafe fn offset(base: NonNull<u8>, offset: usize) -> NonNull<u8> {
    // SAFETY: forwarded from the caller.
    unsafe { base.add(offset) }
}
