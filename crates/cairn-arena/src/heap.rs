//! The heap orchestrator.
//!
//! [`Heap`] is the top-level allocator handed to a script runtime. Every
//! request goes through three tiers in order:
//!
//! 1. **Free list**: first fit over previously released ranges.
//! 2. **Bump**: carve the block from the unused tail of the active chunk.
//! 3. **Growth**: retire the active chunk's tail into the free list,
//!    acquire a fresh chunk from the [`ChunkSource`], bump from it.
//!
//! Releases decode the block header, validate it when debug assertions are
//! enabled, and hand the raw range back to the free list, where it is
//! merged with any adjacent free ranges.

use std::ptr::{self, NonNull};

use cairn_core::layout::{self, largest_block_in, FREE_FILL};
use cairn_core::{AllocStats, ConfigError, HeapConfig, HeapError};

use crate::block::{self, BlockExtent};
use crate::chunk::{Chunk, ChunkList};
use crate::free_list::{FreeList, FreeRanges};
use crate::raw;
use crate::source::{ChunkSource, SystemChunkSource};

/// A chunked arena serving one script runtime.
///
/// Single-threaded by construction: the heap holds raw pointers and is
/// neither `Send` nor `Sync`.
///
/// # Memory layout
///
/// ```text
/// chunks[0]: [blk][blk][free ][blk][retired tail ]
/// chunks[1]: [blk][free     ][blk][blk]----unused----
///                                      ▲
///                                      └── bump offset of the active chunk
/// ```
pub struct Heap<S: ChunkSource = SystemChunkSource> {
    /// Validated configuration, immutable after construction.
    config: HeapConfig,
    /// Append-only list of acquired chunks; the last one is active.
    chunks: ChunkList,
    /// Released ranges available for reuse.
    free_list: FreeList,
    /// Running counters.
    stats: AllocStats,
    /// Where chunks come from and go back to.
    source: S,
}

impl Heap<SystemChunkSource> {
    /// Create a heap backed by the global allocator.
    ///
    /// No memory is acquired until the first allocation.
    pub fn new(config: HeapConfig) -> Result<Self, ConfigError> {
        Self::with_source(config, SystemChunkSource)
    }
}

impl<S: ChunkSource> Heap<S> {
    /// Create a heap that acquires its chunks from `source`.
    ///
    /// Returns `Err(ConfigError)` if `config` fails validation.
    pub fn with_source(config: HeapConfig, source: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chunks: ChunkList::new(config.chunk_size),
            config,
            free_list: FreeList::new(),
            stats: AllocStats::default(),
            source,
        })
    }

    /// Allocate a block with at least `bytes` usable payload bytes.
    ///
    /// The payload is 8-byte aligned. With debug assertions enabled its
    /// contents are filled with [`ALLOC_FILL`](layout::ALLOC_FILL);
    /// otherwise they are unspecified.
    ///
    /// # Errors
    ///
    /// [`HeapError::RequestTooLarge`] if the block could never fit in a
    /// chunk, [`HeapError::OutOfMemory`] if a new chunk was needed and the
    /// source refused it.
    #[allow(unsafe_code)]
    pub fn allocate(&mut self, bytes: usize) -> Result<NonNull<u8>, HeapError> {
        let block_size = self.block_size_for(bytes)?;
        let start = match self.free_list.take(block_size) {
            Some(start) => start,
            None => self.bump_or_grow(block_size)?,
        };
        // SAFETY: start..start + block_size was just removed from the free
        // list or bumped from a chunk, so nothing else refers to it.
        let payload = unsafe { block::prepare(start, block_size) };

        self.stats.record_allocation(block_size);
        self.stats.record_free_list_len(self.free_list.len());
        tracing::trace!(bytes, block_size, payload = payload.as_ptr() as usize, "allocate");
        Ok(payload)
    }

    /// Return a block to the heap. A null pointer is a no-op.
    ///
    /// # Errors
    ///
    /// With debug assertions enabled, [`HeapError::Misuse`] for a pointer
    /// this heap never issued or a block that is already free, and
    /// [`HeapError::CorruptionDetected`] if the block's guards or header
    /// were overwritten. The block is not reclaimed in either case.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live payload pointer issued by this heap.
    /// Violations are only detected with debug assertions enabled.
    #[allow(unsafe_code)]
    pub unsafe fn release(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        let Some(payload) = NonNull::new(ptr) else {
            return Ok(());
        };
        // SAFETY: forwarded from the caller.
        let extent = unsafe { self.checked_extent(payload)? };
        // SAFETY: the extent was validated (or is trusted) as a live block.
        unsafe { self.reclaim(extent) };
        tracing::trace!(payload = payload.as_ptr() as usize, size = extent.size, "release");
        Ok(())
    }

    /// Resize a block following the runtime's reallocate contract.
    ///
    /// | `ptr`    | `new_size` | effect                                  |
    /// |----------|------------|-----------------------------------------|
    /// | null     | 0          | nothing, returns null                   |
    /// | null     | n          | [`allocate`](Self::allocate)`(n)`       |
    /// | p        | 0          | [`release`](Self::release)`(p)`, null   |
    /// | p        | n          | `p` if the block already fits `n`, else |
    /// |          |            | a new block holding the old contents    |
    ///
    /// When the block moves, the first `min(old usable, n)` bytes are
    /// copied. If the new allocation fails the old block is left intact.
    ///
    /// # Errors
    ///
    /// Any error of [`allocate`](Self::allocate) or [`release`](Self::release).
    ///
    /// # Safety
    ///
    /// Same as [`release`](Self::release).
    #[allow(unsafe_code)]
    pub unsafe fn resize(&mut self, ptr: *mut u8, new_size: usize) -> Result<*mut u8, HeapError> {
        let Some(payload) = NonNull::new(ptr) else {
            if new_size == 0 {
                return Ok(ptr::null_mut());
            }
            return self.allocate(new_size).map(NonNull::as_ptr);
        };
        if new_size == 0 {
            // SAFETY: forwarded from the caller.
            unsafe { self.release(ptr)? };
            return Ok(ptr::null_mut());
        }

        // SAFETY: forwarded from the caller.
        let extent = unsafe { self.checked_extent(payload)? };
        let usable = extent.usable();
        if usable >= new_size {
            self.stats.record_resize(false);
            tracing::trace!(payload = ptr as usize, new_size, "resize in place");
            return Ok(ptr);
        }

        let fresh = self.allocate(new_size)?;
        // SAFETY: both payloads are live, distinct blocks; the old one holds
        // `usable` bytes and the new one more than that. The old block is
        // reclaimed only after the copy.
        unsafe {
            raw::copy_payload(payload, fresh, usable.min(new_size));
            self.reclaim(extent);
        }
        self.stats.record_resize(true);
        tracing::trace!(
            from = ptr as usize,
            to = fresh.as_ptr() as usize,
            new_size,
            "resize moved"
        );
        Ok(fresh.as_ptr())
    }

    /// Usable payload bytes of a live block (its size minus metadata).
    ///
    /// # Safety
    ///
    /// Same as [`release`](Self::release).
    #[allow(unsafe_code)]
    pub unsafe fn usable_size(&self, payload: NonNull<u8>) -> Result<usize, HeapError> {
        // SAFETY: forwarded from the caller.
        unsafe { self.checked_extent(payload) }.map(|e| e.usable())
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> AllocStats {
        self.stats
    }

    /// The configuration this heap was built with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Number of chunks acquired so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total bytes acquired from the chunk source.
    pub fn heap_bytes(&self) -> usize {
        self.chunks.memory_bytes()
    }

    /// Free ranges in address order.
    pub fn free_ranges(&self) -> FreeRanges<'_> {
        self.free_list.iter()
    }

    /// Acquired chunks in acquisition order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    // ── Internals ──────────────────────────────────────────────

    fn block_size_for(&self, bytes: usize) -> Result<usize, HeapError> {
        layout::block_size_for(bytes)
            .filter(|&size| size <= self.config.chunk_size)
            .ok_or_else(|| {
                let max_block = largest_block_in(self.config.chunk_size);
                tracing::warn!(bytes, max_block, "request exceeds the largest block");
                HeapError::RequestTooLarge {
                    requested: bytes,
                    max_block,
                }
            })
    }

    #[allow(unsafe_code)]
    fn bump_or_grow(&mut self, block_size: usize) -> Result<NonNull<u8>, HeapError> {
        if let Some(start) = self.chunks.bump(block_size) {
            return Ok(start);
        }
        if let Some((tail, len)) = self.chunks.retire_tail() {
            tracing::trace!(tail = tail.as_ptr() as usize, len, "retired chunk tail");
            let chunks = &self.chunks;
            // SAFETY: the tail was never handed out and the chunk will not
            // bump-allocate again.
            unsafe { self.free_list.insert(tail, len, |a| chunks.is_base(a)) };
            self.stats.record_free_list_len(self.free_list.len());
        }

        let out_of_memory = HeapError::OutOfMemory {
            requested: block_size,
            chunk_size: self.config.chunk_size,
        };
        let Some(index) = self.chunks.grow(&mut self.source) else {
            tracing::warn!(
                block_size,
                chunk_size = self.config.chunk_size,
                chunks = self.chunks.len(),
                "chunk source exhausted"
            );
            return Err(out_of_memory);
        };
        self.stats.record_chunk(self.config.chunk_size);
        tracing::debug!(
            index,
            chunk_size = self.config.chunk_size,
            heap_bytes = self.stats.heap_bytes,
            "acquired chunk"
        );
        // A fresh chunk always fits: block_size <= chunk_size.
        self.chunks.bump(block_size).ok_or(out_of_memory)
    }

    /// Decode `payload`, validating it when debug assertions are enabled.
    ///
    /// # Safety
    ///
    /// Without debug assertions, `payload` must be a live block of this heap.
    #[allow(unsafe_code)]
    unsafe fn checked_extent(&self, payload: NonNull<u8>) -> Result<BlockExtent, HeapError> {
        if cfg!(debug_assertions) {
            let owner = self.chunks.find(payload.as_ptr() as usize);
            block::validate(payload, owner, &self.free_list)
        } else {
            // SAFETY: forwarded from the caller.
            Ok(unsafe { block::decode(payload) })
        }
    }

    /// Scrub a live block and link it into the free list.
    ///
    /// # Safety
    ///
    /// `extent` must describe a live block of this heap that is no longer
    /// referenced.
    #[allow(unsafe_code)]
    unsafe fn reclaim(&mut self, extent: BlockExtent) {
        // SAFETY: forwarded from the caller.
        unsafe {
            if cfg!(debug_assertions) {
                raw::fill(extent.start, extent.size, FREE_FILL);
            }
            let chunks = &self.chunks;
            self.free_list
                .insert(extent.start, extent.size, |a| chunks.is_base(a));
        }
        self.stats.record_release(extent.size);
        self.stats.record_free_list_len(self.free_list.len());
    }
}

impl<S: ChunkSource> Drop for Heap<S> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        if self.stats.live_allocations > 0 {
            tracing::debug!(
                live = self.stats.live_allocations,
                bytes = self.stats.bytes_in_use,
                "heap dropped with live allocations"
            );
        }
        tracing::debug!(chunks = self.chunks.len(), "releasing chunks");
        // SAFETY: the heap owns every chunk and is going away, so no
        // payload pointer may be used after this.
        unsafe { self.chunks.release_all(&mut self.source) };
    }
}

impl<S: ChunkSource> std::fmt::Debug for Heap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("config", &self.config)
            .field("chunks", &self.chunks.len())
            .field("free_list_nodes", &self.free_list.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use cairn_core::layout::{usable_size, MIN_BLOCK_SIZE};
    use cairn_core::MisuseKind;

    fn heap(chunk_size: usize) -> Heap {
        Heap::new(HeapConfig::new(chunk_size)).unwrap()
    }

    fn addr(p: NonNull<u8>) -> usize {
        p.as_ptr() as usize
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            Heap::new(HeapConfig::new(8)),
            Err(ConfigError::ChunkTooSmall { .. })
        ));
        assert!(matches!(
            Heap::new(HeapConfig::new(1000)),
            Err(ConfigError::ChunkMisaligned { .. })
        ));
    }

    #[test]
    fn first_chunk_is_lazy() {
        let mut h = heap(1024);
        assert_eq!(h.chunk_count(), 0);
        h.allocate(1).unwrap();
        assert_eq!(h.chunk_count(), 1);
        assert_eq!(h.heap_bytes(), 1024);
        assert_eq!(h.stats().chunk_count, 1);
    }

    #[test]
    fn payload_is_aligned_and_sized() {
        let mut h = heap(1024);
        for n in [0, 1, 4, 5, 20, 21, 100] {
            let p = h.allocate(n).unwrap();
            assert_eq!(addr(p) % 8, 0);
            let usable = unsafe { h.usable_size(p) }.unwrap();
            assert!(usable >= n);
        }
    }

    #[test]
    fn release_then_allocate_reuses_block() {
        let mut h = heap(1024);
        let a = h.allocate(40).unwrap();
        let _guard = h.allocate(40).unwrap();
        unsafe { h.release(a.as_ptr()) }.unwrap();
        let b = h.allocate(40).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn release_null_is_noop() {
        let mut h = heap(1024);
        unsafe { h.release(ptr::null_mut()) }.unwrap();
        assert_eq!(h.stats(), AllocStats::default());
    }

    #[test]
    fn adjacent_releases_coalesce_in_either_order() {
        for reverse in [false, true] {
            let mut h = heap(1024);
            let a = h.allocate(4).unwrap();
            let b = h.allocate(4).unwrap();
            let _tail = h.allocate(4).unwrap();
            let (first, second) = if reverse { (b, a) } else { (a, b) };
            unsafe {
                h.release(first.as_ptr()).unwrap();
                h.release(second.as_ptr()).unwrap();
            }
            let ranges: Vec<_> = h.free_ranges().collect();
            assert_eq!(ranges.len(), 1);
            assert_eq!(ranges[0].start, addr(a) - 8);
            assert_eq!(ranges[0].size, 2 * MIN_BLOCK_SIZE);
        }
    }

    #[test]
    fn bytes_in_use_tracks_live_blocks() {
        let mut h = heap(1024);
        let a = h.allocate(4).unwrap(); // 16
        let b = h.allocate(30).unwrap(); // 64
        let _c = h.allocate(100).unwrap(); // 128
        assert_eq!(h.stats().bytes_in_use, 208);
        unsafe { h.release(b.as_ptr()) }.unwrap();
        assert_eq!(h.stats().bytes_in_use, 144);
        unsafe { h.release(a.as_ptr()) }.unwrap();
        let s = h.stats();
        assert_eq!(s.bytes_in_use, 128);
        assert_eq!(s.live_allocations, 1);
        assert_eq!(s.peak_bytes_in_use, 208);
        assert_eq!(s.peak_live_allocations, 3);
        assert_eq!(s.total_releases, 2);
    }

    #[test]
    fn resize_null_zero_is_noop() {
        let mut h = heap(1024);
        let p = unsafe { h.resize(ptr::null_mut(), 0) }.unwrap();
        assert!(p.is_null());
        assert_eq!(h.chunk_count(), 0);
    }

    #[test]
    fn resize_null_allocates() {
        let mut h = heap(1024);
        let p = unsafe { h.resize(ptr::null_mut(), 10) }.unwrap();
        assert!(!p.is_null());
        assert_eq!(h.stats().live_allocations, 1);
    }

    #[test]
    fn resize_to_zero_releases() {
        let mut h = heap(1024);
        let p = h.allocate(10).unwrap();
        let q = unsafe { h.resize(p.as_ptr(), 0) }.unwrap();
        assert!(q.is_null());
        assert_eq!(h.stats().live_allocations, 0);
    }

    #[test]
    fn resize_within_slack_keeps_pointer() {
        let mut h = heap(1024);
        let p = h.allocate(5).unwrap(); // 32-byte block, 20 usable
        let q = unsafe { h.resize(p.as_ptr(), usable_size(32)) }.unwrap();
        assert_eq!(q, p.as_ptr());
        let q = unsafe { h.resize(p.as_ptr(), 1) }.unwrap();
        assert_eq!(q, p.as_ptr());
        assert_eq!(h.stats().in_place_resizes, 2);
        assert_eq!(h.stats().moving_resizes, 0);
    }

    #[test]
    fn growing_resize_preserves_contents() {
        let mut h = heap(1024);
        let p = h.allocate(20).unwrap();
        unsafe {
            for i in 0..20 {
                p.as_ptr().add(i).write(i as u8);
            }
            let q = h.resize(p.as_ptr(), 200).unwrap();
            assert_ne!(q, p.as_ptr());
            for i in 0..20 {
                assert_eq!(q.add(i).read(), i as u8);
            }
        }
        let s = h.stats();
        assert_eq!(s.live_allocations, 1);
        assert_eq!(s.moving_resizes, 1);
    }

    #[test]
    fn request_larger_than_chunk_is_refused() {
        let mut h = heap(1024);
        let err = h.allocate(1024).unwrap_err();
        assert_eq!(
            err,
            HeapError::RequestTooLarge {
                requested: 1024,
                max_block: 1024,
            }
        );
        assert_eq!(h.chunk_count(), 0);
        // The largest block that fits is exactly one chunk.
        assert!(h.allocate(1024 - 12).is_ok());
    }

    #[test]
    fn unused_tail_is_retired_into_free_list() {
        let mut h = heap(1024);
        let _a = h.allocate(500).unwrap(); // 512
        let _b = h.allocate(200).unwrap(); // 256, leaves a 256-byte tail
        let c = h.allocate(500).unwrap(); // needs a new chunk
        assert_eq!(h.chunk_count(), 2);
        let ranges: Vec<_> = h.free_ranges().collect();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].size, 256);
        // The retired tail now serves a fitting request without growth.
        let d = h.allocate(200).unwrap();
        assert_eq!(addr(d) - 8, ranges[0].start);
        assert_ne!(addr(c), addr(d));
        assert_eq!(h.chunk_count(), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn double_release_is_detected() {
        let mut h = heap(1024);
        let p = h.allocate(4).unwrap();
        let _keep = h.allocate(4).unwrap();
        unsafe { h.release(p.as_ptr()) }.unwrap();
        let err = unsafe { h.release(p.as_ptr()) }.unwrap_err();
        assert!(matches!(
            err,
            HeapError::Misuse {
                kind: MisuseKind::DoubleRelease,
                ..
            }
        ));
        assert_eq!(h.stats().total_releases, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn foreign_pointer_is_detected() {
        let mut h = heap(1024);
        let _p = h.allocate(4).unwrap();
        let mut local = [0u64; 4];
        let err = unsafe { h.release(local.as_mut_ptr().cast()) }.unwrap_err();
        assert!(matches!(
            err,
            HeapError::Misuse {
                kind: MisuseKind::ForeignPointer,
                ..
            }
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn released_block_is_scrubbed() {
        let mut h = heap(1024);
        let p = h.allocate(40).unwrap(); // 64-byte block
        let _keep = h.allocate(4).unwrap();
        unsafe {
            h.release(p.as_ptr()).unwrap();
            // Past the free-list node, the block holds the free fill.
            let tail = std::slice::from_raw_parts(p.as_ptr().add(8), 64 - 16);
            assert!(tail.iter().all(|&b| b == FREE_FILL));
        }
    }
}
