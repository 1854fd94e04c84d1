//! Chunk sources: where the heap gets its memory from.
//!
//! A [`ChunkSource`] hands out large fixed-size regions on demand and takes
//! them back when the heap is dropped. The heap never moves, shrinks or
//! partially returns a region.

use std::fmt;
use std::ptr::NonNull;

use crate::raw;

/// Host-supplied strategy for acquiring and releasing chunks.
///
/// Regions returned by [`acquire`](ChunkSource::acquire) must be exactly
/// `size` bytes, writable, and aligned to
/// [`MIN_BLOCK_SIZE`](cairn_core::layout::MIN_BLOCK_SIZE). A heap rejects
/// misaligned regions.
#[allow(unsafe_code)]
pub trait ChunkSource {
    /// Acquire a region of `size` bytes, or `None` if the host is out of memory.
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Return a region previously handed out by [`acquire`](ChunkSource::acquire).
    ///
    /// # Safety
    ///
    /// `base` must have been returned by `acquire(size)` on this source with
    /// the same `size`, and must not be used or released again afterwards.
    unsafe fn release(&mut self, base: NonNull<u8>, size: usize);
}

#[allow(unsafe_code)]
impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        (**self).acquire(size)
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).release(base, size) }
    }
}

/// Chunk source backed by the process's global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemChunkSource;

#[allow(unsafe_code)]
impl ChunkSource for SystemChunkSource {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        raw::alloc_region(size)
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // SAFETY: base came from acquire(size), i.e. alloc_region(size).
        unsafe { raw::dealloc_region(base, size) }
    }
}

/// Chunk source built from a pair of host closures.
///
/// Lets an embedder route chunk traffic through its own allocator without
/// implementing [`ChunkSource`] by hand.
pub struct FnChunkSource<A, R> {
    acquire: A,
    release: R,
}

impl<A, R> FnChunkSource<A, R>
where
    A: FnMut(usize) -> Option<NonNull<u8>>,
    R: FnMut(NonNull<u8>, usize),
{
    /// Wrap an acquire and a release closure.
    pub fn new(acquire: A, release: R) -> Self {
        Self { acquire, release }
    }
}

#[allow(unsafe_code)]
impl<A, R> ChunkSource for FnChunkSource<A, R>
where
    A: FnMut(usize) -> Option<NonNull<u8>>,
    R: FnMut(NonNull<u8>, usize),
{
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        (self.acquire)(size)
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        (self.release)(base, size)
    }
}

impl<A, R> fmt::Debug for FnChunkSource<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnChunkSource").finish_non_exhaustive()
    }
}
