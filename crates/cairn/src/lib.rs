//! Cairn: a chunked arena heap for embedded script runtimes.
//!
//! Script interpreters route every allocation through a single reallocate
//! hook. Cairn implements that hook on top of large chunks obtained from
//! the host, with guard words around every block, an address-ordered free
//! list that coalesces on release, and running statistics.
//!
//! This facade re-exports the public API of the sub-crates. For most
//! users, adding `cairn` as a single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use cairn::prelude::*;
//!
//! let mut heap = Heap::new(HeapConfig::new(64 * 1024)).unwrap();
//! let p = heap.allocate(100).unwrap();
//! let q = unsafe { heap.resize(p.as_ptr(), 300) }.unwrap();
//! unsafe { heap.release(q) }.unwrap();
//!
//! let stats = heap.stats();
//! assert_eq!(stats.live_allocations, 0);
//! assert_eq!(stats.moving_resizes, 1);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Block layout, configuration, errors and statistics (`cairn-core`).
pub use cairn_core as types;

/// The heap, chunk sources and the reallocate hook (`cairn-arena`).
pub use cairn_arena as arena;

/// Common imports for typical Cairn usage.
///
/// ```rust
/// use cairn::prelude::*;
/// ```
pub mod prelude {
    // Heap
    pub use cairn_arena::{reallocate_trampoline, Heap};

    // Chunk sources
    pub use cairn_arena::{ChunkSource, FnChunkSource, SystemChunkSource};

    // Configuration and statistics
    pub use cairn_core::{AllocStats, HeapConfig};

    // Errors
    pub use cairn_core::{ConfigError, Corruption, HeapError, MisuseKind};
}
