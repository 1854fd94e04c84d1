//! C FFI bindings for the Cairn script heap.
//!
//! Exposes a C-compatible API so a script runtime written in C or C++ can
//! install a [`Heap`](cairn_arena::Heap) as its reallocate hook. This crate
//! is one of two that may contain `unsafe` code (along with `cairn-arena`).
//!
//! A typical host:
//!
//! ```text
//! CairnHeapConfig cfg;
//! cairn_heap_config_default(&cfg);
//! CairnHeap *heap;
//! cairn_heap_create(&cfg, &heap);
//! vm_config.reallocateFn = cairn_reallocate;
//! vm_config.userData = heap;
//! ...
//! cairn_heap_destroy(heap);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run `$body` (an `i32` status expression), turning a panic into
/// [`CairnStatus::Panicked`](crate::status::CairnStatus::Panicked).
macro_rules! ffi_guard {
    ($body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| -> i32 { $body })) {
            Ok(status) => status,
            Err(_) => {
                tracing::error!("panic caught at FFI boundary");
                $crate::status::CairnStatus::Panicked as i32
            }
        }
    };
}

pub mod heap;
pub mod stats;
pub mod status;

pub use heap::{
    cairn_heap_config_default, cairn_heap_create, cairn_heap_destroy, cairn_heap_usable_size,
    cairn_reallocate, CairnChunkAcquireFn, CairnChunkReleaseFn, CairnHeap, CairnHeapConfig,
};
pub use stats::{cairn_heap_stats, CairnAllocStats};
pub use status::CairnStatus;
