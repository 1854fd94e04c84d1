//! Chunks and the append-only chunk list.
//!
//! A [`Chunk`] is one large region obtained from a [`ChunkSource`] with a
//! bump offset. A [`ChunkList`] is a growable collection of chunks where
//! the active chunk is tracked by index, so growing the list (which may
//! move the list's own backing storage) never invalidates it.

use std::ptr::NonNull;

use smallvec::SmallVec;

use cairn_core::layout::MIN_BLOCK_SIZE;

use crate::raw;
use crate::source::ChunkSource;

/// A single region with bump allocation.
///
/// Chunks are never moved or shrunk; they are returned to their source
/// only when the owning heap is dropped.
#[derive(Debug)]
pub struct Chunk {
    base: NonNull<u8>,
    size: usize,
    /// Bump offset: start of the unused tail, in bytes from `base`.
    offset: usize,
}

impl Chunk {
    fn new(base: NonNull<u8>, size: usize) -> Self {
        Self {
            base,
            size,
            offset: 0,
        }
    }

    /// Bump-allocate `len` bytes from the unused tail.
    ///
    /// Returns `None` if the remaining space is too small.
    #[allow(unsafe_code)]
    pub(crate) fn bump(&mut self, len: usize) -> Option<NonNull<u8>> {
        let new_offset = self.offset.checked_add(len)?;
        if new_offset > self.size {
            return None;
        }
        // SAFETY: offset < new_offset <= size, so the result is inside the chunk.
        let ptr = unsafe { raw::offset(self.base, self.offset) };
        self.offset = new_offset;
        Some(ptr)
    }

    /// Give up the unused tail, returning it if it can host a block.
    ///
    /// Afterwards the chunk is full. Tails smaller than a minimum block are
    /// discarded.
    #[allow(unsafe_code)]
    pub(crate) fn retire_tail(&mut self) -> Option<(NonNull<u8>, usize)> {
        let remaining = self.remaining();
        let start = self.offset;
        self.offset = self.size;
        if remaining < MIN_BLOCK_SIZE {
            return None;
        }
        // SAFETY: start < size.
        Some((unsafe { raw::offset(self.base, start) }, remaining))
    }

    /// Start address of the chunk.
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Whether `addr` lies inside the part of the chunk that has been handed out.
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr < base + self.offset
    }

    /// Bytes handed out so far (live blocks, free ranges, retired tail).
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Total size in bytes.
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Bytes still available for bump allocation.
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }
}

/// A growable list of [`Chunk`]s with an active-chunk index.
///
/// Only the newest chunk is ever bump-allocated from. Older chunks are
/// reused exclusively through the free list.
#[derive(Debug)]
pub struct ChunkList {
    chunks: SmallVec<[Chunk; 4]>,
    chunk_size: usize,
    /// Index of the chunk currently being filled, once one exists.
    current: Option<usize>,
}

impl ChunkList {
    /// Create an empty list. No chunk is acquired until the first growth.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: SmallVec::new(),
            chunk_size,
            current: None,
        }
    }

    /// Bump-allocate `len` bytes from the active chunk.
    pub(crate) fn bump(&mut self, len: usize) -> Option<NonNull<u8>> {
        let current = self.current?;
        self.chunks[current].bump(len)
    }

    /// Retire the unused tail of the active chunk (see [`Chunk::retire_tail`]).
    pub(crate) fn retire_tail(&mut self) -> Option<(NonNull<u8>, usize)> {
        let current = self.current?;
        self.chunks[current].retire_tail()
    }

    /// Acquire a fresh chunk from `source` and make it the active one.
    ///
    /// Returns `None` if the source fails or hands back a region that is not
    /// aligned to the minimum block size (such a region is released again).
    #[allow(unsafe_code)]
    pub(crate) fn grow<S: ChunkSource + ?Sized>(&mut self, source: &mut S) -> Option<usize> {
        let base = source.acquire(self.chunk_size)?;
        if base.as_ptr() as usize % MIN_BLOCK_SIZE != 0 {
            tracing::error!(
                base = base.as_ptr() as usize,
                "chunk source returned a misaligned region"
            );
            // SAFETY: base was just acquired with this size and never used.
            unsafe { source.release(base, self.chunk_size) };
            return None;
        }
        self.chunks.push(Chunk::new(base, self.chunk_size));
        let index = self.chunks.len() - 1;
        self.current = Some(index);
        Some(index)
    }

    /// The chunk whose handed-out range contains `addr`.
    pub fn find(&self, addr: usize) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.contains(addr))
    }

    /// Whether `addr` is the first byte of some chunk.
    pub fn is_base(&self, addr: usize) -> bool {
        self.chunks.iter().any(|c| c.base_addr() == addr)
    }

    /// Return every chunk to `source`, leaving the list empty.
    ///
    /// # Safety
    ///
    /// No pointer into any chunk may be used afterwards, and `source` must
    /// be the source every chunk was acquired from.
    #[allow(unsafe_code)]
    pub(crate) unsafe fn release_all<S: ChunkSource + ?Sized>(&mut self, source: &mut S) {
        for chunk in self.chunks.drain(..) {
            // SAFETY: each chunk was acquired from source with chunk.size.
            unsafe { source.release(chunk.base, chunk.size) };
        }
        self.current = None;
    }

    /// Number of chunks acquired.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk has been acquired yet.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index of the active chunk.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Size of every chunk in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total bytes acquired across all chunks.
    pub fn memory_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.capacity()).sum()
    }

    /// Total bytes handed out across all chunks.
    pub fn total_used(&self) -> usize {
        self.chunks.iter().map(|c| c.used()).sum()
    }

    /// Iterate over the chunks in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::source::SystemChunkSource;

    fn list_with_chunk(chunk_size: usize) -> (ChunkList, SystemChunkSource) {
        let mut source = SystemChunkSource;
        let mut list = ChunkList::new(chunk_size);
        list.grow(&mut source).unwrap();
        (list, source)
    }

    #[test]
    fn empty_list_cannot_bump() {
        let mut list = ChunkList::new(1024);
        assert!(list.bump(16).is_none());
        assert!(list.is_empty());
        assert_eq!(list.current(), None);
    }

    #[test]
    fn sequential_bumps_are_contiguous() {
        let (mut list, mut source) = list_with_chunk(1024);
        let a = list.bump(16).unwrap().as_ptr() as usize;
        let b = list.bump(32).unwrap().as_ptr() as usize;
        assert_eq!(b - a, 16);
        assert_eq!(list.total_used(), 48);
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn bump_fails_when_full() {
        let (mut list, mut source) = list_with_chunk(64);
        assert!(list.bump(64).is_some());
        assert!(list.bump(16).is_none());
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn offset_never_exceeds_size() {
        let (mut list, mut source) = list_with_chunk(64);
        list.bump(48).unwrap();
        assert!(list.bump(32).is_none());
        assert_eq!(list.total_used(), 48);
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn retire_tail_returns_remainder() {
        let (mut list, mut source) = list_with_chunk(1024);
        let first = list.bump(512).unwrap().as_ptr() as usize;
        let (tail, len) = list.retire_tail().unwrap();
        assert_eq!(tail.as_ptr() as usize, first + 512);
        assert_eq!(len, 512);
        assert!(list.bump(16).is_none(), "retired chunk is full");
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn retire_tail_of_full_chunk_is_none() {
        let (mut list, mut source) = list_with_chunk(64);
        list.bump(64).unwrap();
        assert!(list.retire_tail().is_none());
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn grow_advances_active_index() {
        let (mut list, mut source) = list_with_chunk(64);
        list.bump(64).unwrap();
        assert_eq!(list.grow(&mut source), Some(1));
        assert_eq!(list.current(), Some(1));
        assert_eq!(list.len(), 2);
        assert_eq!(list.memory_bytes(), 128);
        assert!(list.bump(64).is_some());
        unsafe { list.release_all(&mut source) };
        assert!(list.is_empty());
    }

    #[test]
    fn find_locates_owning_chunk() {
        let (mut list, mut source) = list_with_chunk(64);
        let a = list.bump(16).unwrap().as_ptr() as usize;
        list.grow(&mut source).unwrap();
        let b = list.bump(16).unwrap().as_ptr() as usize;
        assert_eq!(list.find(a).unwrap().base_addr(), a);
        assert_eq!(list.find(b).unwrap().base_addr(), b);
        // Past the bump offset of the first chunk: not handed out yet.
        assert!(list.find(a + 16).is_none());
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn is_base_matches_only_chunk_starts() {
        let (mut list, mut source) = list_with_chunk(64);
        let a = list.bump(16).unwrap().as_ptr() as usize;
        assert!(list.is_base(a));
        assert!(!list.is_base(a + 16));
        unsafe { list.release_all(&mut source) };
    }

    #[test]
    fn failing_source_leaves_list_unchanged() {
        struct Dry;
        impl ChunkSource for Dry {
            fn acquire(&mut self, _size: usize) -> Option<NonNull<u8>> {
                None
            }
            unsafe fn release(&mut self, _base: NonNull<u8>, _size: usize) {}
        }
        let mut list = ChunkList::new(64);
        assert!(list.grow(&mut Dry).is_none());
        assert!(list.is_empty());
    }
}
