//! Glue between a [`Heap`] and a script runtime's reallocate hook.
//!
//! Script runtimes route every allocation through one callback of the shape
//! `fn(memory, new_size, user_data) -> memory`, with no way to report an
//! error other than a null return. This module applies the fault policy:
//!
//! - exhaustion and oversized requests are logged and surface as null, which
//!   the runtime treats as out-of-memory;
//! - corruption and misuse are logged and then panic. The heap can no longer
//!   be trusted, and unwinding out of an `extern "C"` function aborts.

use std::ffi::c_void;
use std::ptr;

use crate::heap::Heap;
use crate::source::ChunkSource;

impl<S: ChunkSource> Heap<S> {
    /// [`resize`](Heap::resize) with the hook's fault policy applied.
    ///
    /// # Panics
    ///
    /// On any [fatal](cairn_core::HeapError::is_fatal) error.
    ///
    /// # Safety
    ///
    /// Same as [`resize`](Heap::resize).
    #[allow(unsafe_code)]
    pub unsafe fn reallocate(&mut self, memory: *mut u8, new_size: usize) -> *mut u8 {
        // SAFETY: forwarded from the caller.
        match unsafe { self.resize(memory, new_size) } {
            Ok(ptr) => ptr,
            Err(err) if err.is_fatal() => {
                tracing::error!(%err, memory = memory as usize, new_size, "heap fault");
                panic!("script heap fault: {err}");
            }
            Err(err) => {
                tracing::warn!(%err, new_size, "allocation refused");
                ptr::null_mut()
            }
        }
    }
}

/// A reallocate callback that forwards to the `Heap<S>` behind `user_data`.
///
/// Pass this function together with a pointer to the heap when configuring
/// the runtime. No global state is involved, so several runtimes can each
/// carry their own heap.
///
/// # Safety
///
/// `user_data` must point to a live `Heap<S>` that is not otherwise
/// borrowed for the duration of the call, and `memory` must satisfy the
/// contract of [`Heap::resize`].
#[allow(unsafe_code)]
pub unsafe extern "C" fn reallocate_trampoline<S: ChunkSource>(
    memory: *mut c_void,
    new_size: usize,
    user_data: *mut c_void,
) -> *mut c_void {
    if user_data.is_null() {
        tracing::error!("reallocate called without a heap");
        return ptr::null_mut();
    }
    // SAFETY: the caller guarantees user_data is an exclusive Heap<S>.
    let heap = unsafe { &mut *user_data.cast::<Heap<S>>() };
    // SAFETY: forwarded from the caller.
    unsafe { heap.reallocate(memory.cast(), new_size) }.cast()
}
