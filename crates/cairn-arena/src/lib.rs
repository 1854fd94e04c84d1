//! Chunked arena allocator for embedded script runtimes.
//!
//! A script runtime routes every allocation through a single reallocate
//! hook. [`Heap`] services that hook from large chunks obtained on demand
//! from a [`ChunkSource`], reusing released blocks through an intrusive
//! free list. This crate and `cairn-ffi` are the only ones that contain
//! `unsafe` code.
//!
//! # Architecture
//!
//! ```text
//! Heap (orchestrator)
//! ├── ChunkList → Chunk[] (fixed-size regions, bump offset, append-only)
//! ├── FreeList (intrusive, address-ordered, coalescing)
//! ├── block codec (guards + size header around every payload)
//! └── ChunkSource (SystemChunkSource, FnChunkSource, host impls)
//! ```
//!
//! # Block sizing
//!
//! A request for `n` bytes occupies `next_pow2(n + 12)` bytes, never less
//! than 16. See [`cairn_core::layout`].
//!
//! # Debug checks
//!
//! With debug assertions enabled, every release and resize validates the
//! block (owning chunk, double release, both guards, header) before acting
//! on it, fresh payloads are filled with `0xA5` and released blocks with
//! `0xEE`. Release builds trust the caller.
//!
//! # Unsafe boundary
//!
//! All raw reads and writes go through the private `raw` module. Other
//! modules opt in to `unsafe` item by item with a `SAFETY` note per block.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod block;
pub mod chunk;
mod free_list;
pub mod heap;
pub mod hook;
mod raw;
pub mod source;

// Public re-exports for the primary API surface.
pub use free_list::{FreeRange, FreeRanges};
pub use heap::Heap;
pub use hook::reallocate_trampoline;
pub use source::{ChunkSource, FnChunkSource, SystemChunkSource};
