//! Test utilities for Cairn development.
//!
//! Provides instrumented [`ChunkSource`](cairn_arena::ChunkSource)
//! implementations and a [`LiveSet`] model that tracks every live block,
//! stamps it with a byte pattern and checks that no two blocks overlap.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod live_set;
pub mod sources;

pub use live_set::LiveSet;
pub use sources::{CountingSource, MisalignedSource, SourceCounters};

use cairn_arena::Heap;
use cairn_core::HeapConfig;

/// Chunk size used by the small-heap scenarios.
pub const SMALL_CHUNK: usize = 1024;

/// A heap with [`SMALL_CHUNK`]-byte chunks drawn from a [`CountingSource`].
pub fn small_heap() -> (Heap<CountingSource>, std::rc::Rc<SourceCounters>) {
    let source = CountingSource::new();
    let counters = source.counters();
    let heap = Heap::with_source(HeapConfig::new(SMALL_CHUNK), source)
        .expect("SMALL_CHUNK is a valid chunk size");
    (heap, counters)
}
