//! Instrumented chunk sources.
//!
//! - [`CountingSource`]: system memory, counts every acquisition and
//!   release, optionally refuses to grow past a chunk budget.
//! - [`MisalignedSource`]: hands out regions 8 bytes off the 16-byte
//!   grid, which a heap must refuse.

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use cairn_arena::{ChunkSource, SystemChunkSource};

/// Shared view of a source's traffic, readable after the heap takes
/// ownership of the source.
#[derive(Debug, Default)]
pub struct SourceCounters {
    acquired: Cell<usize>,
    released: Cell<usize>,
    refused: Cell<usize>,
    outstanding_bytes: Cell<usize>,
}

impl SourceCounters {
    /// Successful acquisitions.
    pub fn acquired(&self) -> usize {
        self.acquired.get()
    }

    /// Regions returned to the source.
    pub fn released(&self) -> usize {
        self.released.get()
    }

    /// Acquisitions refused because the budget was spent.
    pub fn refused(&self) -> usize {
        self.refused.get()
    }

    /// Bytes acquired and not yet released.
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.get()
    }
}

/// Chunk source over system memory that records its traffic.
#[derive(Debug)]
pub struct CountingSource {
    inner: SystemChunkSource,
    budget: Option<usize>,
    counters: Rc<SourceCounters>,
}

impl CountingSource {
    /// Unlimited source.
    pub fn new() -> Self {
        Self {
            inner: SystemChunkSource,
            budget: None,
            counters: Rc::default(),
        }
    }

    /// Source that refuses every acquisition after the first `chunks`.
    pub fn limited(chunks: usize) -> Self {
        Self {
            budget: Some(chunks),
            ..Self::new()
        }
    }

    /// Handle on the counters, valid after the source is moved into a heap.
    pub fn counters(&self) -> Rc<SourceCounters> {
        Rc::clone(&self.counters)
    }
}

impl Default for CountingSource {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(unsafe_code)]
impl ChunkSource for CountingSource {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        let c = &self.counters;
        if self.budget.is_some_and(|b| c.acquired.get() >= b) {
            c.refused.set(c.refused.get() + 1);
            return None;
        }
        let base = self.inner.acquire(size)?;
        c.acquired.set(c.acquired.get() + 1);
        c.outstanding_bytes.set(c.outstanding_bytes.get() + size);
        Some(base)
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        let c = &self.counters;
        c.released.set(c.released.get() + 1);
        c.outstanding_bytes.set(c.outstanding_bytes.get() - size);
        // SAFETY: forwarded from the caller; base came from inner.acquire.
        unsafe { self.inner.release(base, size) };
    }
}

/// Chunk source whose regions start 8 bytes past a 16-byte boundary.
#[derive(Debug, Default)]
pub struct MisalignedSource {
    inner: CountingSource,
}

impl MisalignedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Rc<SourceCounters> {
        self.inner.counters()
    }
}

#[allow(unsafe_code)]
impl ChunkSource for MisalignedSource {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        let base = self.inner.acquire(size + 16)?;
        // SAFETY: base + 8 is inside the size + 16 byte region.
        Some(unsafe { base.add(8) })
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // SAFETY: undo the offset applied in acquire.
        unsafe { self.inner.release(base.sub(8), size + 16) };
    }
}
