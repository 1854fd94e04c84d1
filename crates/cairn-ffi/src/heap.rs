//! Heap lifecycle FFI: config defaults, create, destroy, reallocate hook.
//!
//! A heap is handed to C as an opaque `CairnHeap *`. The same pointer is
//! what the host stores as the runtime's `user_data`, so
//! [`cairn_reallocate`] reaches its heap without any global table and
//! several runtimes can each own a heap.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use cairn_arena::{ChunkSource, Heap, SystemChunkSource};
use cairn_core::HeapConfig;

use crate::status::CairnStatus;

/// Host chunk allocator: return `size` writable bytes aligned to 16, or null.
pub type CairnChunkAcquireFn =
    Option<unsafe extern "C" fn(size: usize, user_data: *mut c_void) -> *mut c_void>;

/// Host chunk deallocator, called once per chunk when the heap is destroyed.
pub type CairnChunkReleaseFn =
    Option<unsafe extern "C" fn(base: *mut c_void, size: usize, user_data: *mut c_void)>;

/// C-compatible heap configuration.
///
/// `acquire` and `release` must either both be set or both be null; when
/// null, chunks come from the system allocator.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CairnHeapConfig {
    /// Size of every chunk in bytes. Fixed-width for ABI portability.
    pub chunk_size: u64,
    /// Optional host chunk allocator.
    pub acquire: CairnChunkAcquireFn,
    /// Optional host chunk deallocator.
    pub release: CairnChunkReleaseFn,
    /// Passed unchanged to `acquire` and `release`.
    pub source_user_data: *mut c_void,
}

impl Default for CairnHeapConfig {
    fn default() -> Self {
        Self {
            chunk_size: HeapConfig::DEFAULT_CHUNK_SIZE as u64,
            acquire: None,
            release: None,
            source_user_data: ptr::null_mut(),
        }
    }
}

/// Chunk source calling back into the host.
#[derive(Debug)]
pub(crate) struct HostChunkSource {
    acquire: unsafe extern "C" fn(usize, *mut c_void) -> *mut c_void,
    release: unsafe extern "C" fn(*mut c_void, usize, *mut c_void),
    user_data: *mut c_void,
}

#[allow(unsafe_code)]
impl ChunkSource for HostChunkSource {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: the host registered this function for exactly this call.
        NonNull::new(unsafe { (self.acquire)(size, self.user_data) }.cast())
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // SAFETY: base/size came from the matching acquire call.
        unsafe { (self.release)(base.as_ptr().cast(), size, self.user_data) }
    }
}

/// Where an FFI heap gets its chunks.
#[derive(Debug)]
pub(crate) enum FfiSource {
    System(SystemChunkSource),
    Host(HostChunkSource),
}

#[allow(unsafe_code)]
impl ChunkSource for FfiSource {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        match self {
            FfiSource::System(s) => s.acquire(size),
            FfiSource::Host(s) => s.acquire(size),
        }
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // SAFETY: forwarded from the caller.
        unsafe {
            match self {
                FfiSource::System(s) => s.release(base, size),
                FfiSource::Host(s) => s.release(base, size),
            }
        }
    }
}

/// Opaque heap handle.
#[derive(Debug)]
pub struct CairnHeap {
    pub(crate) heap: Heap<FfiSource>,
}

impl CairnHeap {
    fn from_config(config: &CairnHeapConfig) -> Result<Self, CairnStatus> {
        let source = match (config.acquire, config.release) {
            (None, None) => FfiSource::System(SystemChunkSource),
            (Some(acquire), Some(release)) => FfiSource::Host(HostChunkSource {
                acquire,
                release,
                user_data: config.source_user_data,
            }),
            _ => return Err(CairnStatus::InvalidArgument),
        };
        let chunk_size =
            usize::try_from(config.chunk_size).map_err(|_| CairnStatus::ConfigError)?;
        let heap = Heap::with_source(HeapConfig::new(chunk_size), source)
            .map_err(|e| CairnStatus::from(&e))?;
        Ok(Self { heap })
    }
}

/// Fill `out` with the default configuration (5 MiB chunks, system source).
///
/// # Safety
///
/// `out` must be null or valid for writing one `CairnHeapConfig`.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn cairn_heap_config_default(out: *mut CairnHeapConfig) -> i32 {
    if out.is_null() {
        return CairnStatus::InvalidArgument as i32;
    }
    // SAFETY: out is non-null and valid per caller contract.
    unsafe { out.write(CairnHeapConfig::default()) };
    CairnStatus::Ok as i32
}

/// Create a heap. No memory is acquired until the first allocation.
///
/// On success, writes the heap pointer to `heap_out` and returns `Ok`.
///
/// # Safety
///
/// `config` must be valid for reads and `heap_out` for writes.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn cairn_heap_create(
    config: *const CairnHeapConfig,
    heap_out: *mut *mut CairnHeap,
) -> i32 {
    ffi_guard!({
        if config.is_null() || heap_out.is_null() {
            return CairnStatus::InvalidArgument as i32;
        }
        // SAFETY: config is non-null and valid per caller contract.
        let config = unsafe { &*config };
        let heap = match CairnHeap::from_config(config) {
            Ok(h) => h,
            Err(status) => {
                tracing::warn!(chunk_size = config.chunk_size, ?status, "heap config rejected");
                return status as i32;
            }
        };
        tracing::debug!(chunk_size = config.chunk_size, "heap created");
        // SAFETY: heap_out is non-null and valid per caller contract.
        unsafe { heap_out.write(Box::into_raw(Box::new(heap))) };
        CairnStatus::Ok as i32
    })
}

/// Destroy a heap, returning every chunk to its source.
///
/// All pointers issued by the heap become dangling.
///
/// # Safety
///
/// `heap` must be null or a pointer from [`cairn_heap_create`] that has
/// not been destroyed.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn cairn_heap_destroy(heap: *mut CairnHeap) -> i32 {
    ffi_guard!({
        if heap.is_null() {
            return CairnStatus::InvalidHandle as i32;
        }
        // SAFETY: heap came from Box::into_raw in cairn_heap_create.
        drop(unsafe { Box::from_raw(heap) });
        CairnStatus::Ok as i32
    })
}

/// The script runtime's reallocate hook.
///
/// `user_data` is the `CairnHeap *` the runtime was configured with.
/// Follows the contract of [`Heap::resize`]: null + 0 is a no-op, null + n
/// allocates, p + 0 releases, p + n resizes. Returns null when the request
/// cannot be satisfied. Corruption or misuse aborts the process.
///
/// # Safety
///
/// `user_data` must be a live heap not in use by another call, and
/// `memory` must be null or a live block issued by that heap.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn cairn_reallocate(
    memory: *mut c_void,
    new_size: usize,
    user_data: *mut c_void,
) -> *mut c_void {
    // SAFETY: user_data is a CairnHeap per caller contract.
    let Some(heap) = (unsafe { user_data.cast::<CairnHeap>().as_mut() }) else {
        tracing::error!("cairn_reallocate called without a heap");
        return ptr::null_mut();
    };
    // SAFETY: forwarded from the caller.
    match unsafe { heap.heap.resize(memory.cast(), new_size) } {
        Ok(p) => p.cast(),
        Err(err) if err.is_fatal() => {
            tracing::error!(%err, memory = memory as usize, new_size, "heap fault, aborting");
            std::process::abort();
        }
        Err(err) => {
            tracing::warn!(%err, new_size, "allocation refused");
            ptr::null_mut()
        }
    }
}

/// Write the usable payload size of a live block to `size_out`.
///
/// # Safety
///
/// `heap` must be a live heap, `memory` a live block issued by it, and
/// `size_out` valid for writes.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn cairn_heap_usable_size(
    heap: *const CairnHeap,
    memory: *const c_void,
    size_out: *mut usize,
) -> i32 {
    ffi_guard!({
        // SAFETY: heap is null or live per caller contract.
        let Some(heap) = (unsafe { heap.as_ref() }) else {
            return CairnStatus::InvalidHandle as i32;
        };
        let Some(payload) = NonNull::new(memory.cast_mut().cast::<u8>()) else {
            return CairnStatus::InvalidArgument as i32;
        };
        if size_out.is_null() {
            return CairnStatus::InvalidArgument as i32;
        }
        // SAFETY: forwarded from the caller.
        match unsafe { heap.heap.usable_size(payload) } {
            Ok(size) => {
                // SAFETY: size_out is non-null and valid per caller contract.
                unsafe { size_out.write(size) };
                CairnStatus::Ok as i32
            }
            Err(e) => CairnStatus::from(&e) as i32,
        }
    })
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::alloc::{alloc, dealloc, Layout};
    use std::cell::Cell;

    fn create(config: &CairnHeapConfig) -> *mut CairnHeap {
        let mut heap = ptr::null_mut();
        let status = unsafe { cairn_heap_create(config, &mut heap) };
        assert_eq!(status, CairnStatus::Ok as i32);
        assert!(!heap.is_null());
        heap
    }

    fn small_config() -> CairnHeapConfig {
        CairnHeapConfig {
            chunk_size: 1024,
            ..CairnHeapConfig::default()
        }
    }

    #[test]
    fn default_config_uses_five_mib_chunks() {
        let mut cfg = small_config();
        assert_eq!(unsafe { cairn_heap_config_default(&mut cfg) }, 0);
        assert_eq!(cfg.chunk_size, 0x50_0000);
        assert!(cfg.acquire.is_none() && cfg.release.is_none());
    }

    #[test]
    fn create_rejects_bad_arguments() {
        let mut heap = ptr::null_mut();
        assert_eq!(
            unsafe { cairn_heap_create(ptr::null(), &mut heap) },
            CairnStatus::InvalidArgument as i32
        );
        let cfg = small_config();
        assert_eq!(
            unsafe { cairn_heap_create(&cfg, ptr::null_mut()) },
            CairnStatus::InvalidArgument as i32
        );
        let cfg = CairnHeapConfig {
            chunk_size: 1000,
            ..CairnHeapConfig::default()
        };
        assert_eq!(
            unsafe { cairn_heap_create(&cfg, &mut heap) },
            CairnStatus::ConfigError as i32
        );
        assert!(heap.is_null());
    }

    #[test]
    fn half_configured_host_source_is_rejected() {
        unsafe extern "C" fn acquire(_: usize, _: *mut c_void) -> *mut c_void {
            ptr::null_mut()
        }
        let cfg = CairnHeapConfig {
            acquire: Some(acquire),
            ..small_config()
        };
        let mut heap = ptr::null_mut();
        assert_eq!(
            unsafe { cairn_heap_create(&cfg, &mut heap) },
            CairnStatus::InvalidArgument as i32
        );
    }

    #[test]
    fn destroy_null_is_invalid_handle() {
        assert_eq!(
            unsafe { cairn_heap_destroy(ptr::null_mut()) },
            CairnStatus::InvalidHandle as i32
        );
    }

    #[test]
    fn reallocate_follows_hook_contract() {
        let heap = create(&small_config());
        let ud = heap.cast::<c_void>();
        unsafe {
            assert!(cairn_reallocate(ptr::null_mut(), 0, ud).is_null());
            let p = cairn_reallocate(ptr::null_mut(), 10, ud);
            assert!(!p.is_null());
            p.cast::<u8>().write_bytes(7, 10);

            let mut usable = 0;
            assert_eq!(cairn_heap_usable_size(heap, p, &mut usable), 0);
            assert_eq!(usable, 20);

            let q = cairn_reallocate(p, 100, ud);
            assert!(!q.is_null());
            assert!(std::slice::from_raw_parts(q.cast::<u8>(), 10).iter().all(|&b| b == 7));
            assert!(cairn_reallocate(q, 0, ud).is_null());

            assert!(cairn_reallocate(ptr::null_mut(), 4096, ud).is_null());
            assert_eq!(cairn_heap_destroy(heap), 0);
        }
    }

    #[test]
    fn reallocate_without_heap_returns_null() {
        let p = unsafe { cairn_reallocate(ptr::null_mut(), 16, ptr::null_mut()) };
        assert!(p.is_null());
    }

    thread_local! {
        static HOST_BYTES: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn host_acquire(size: usize, user_data: *mut c_void) -> *mut c_void {
        assert_eq!(user_data as usize, 0xC0FFEE);
        HOST_BYTES.with(|b| b.set(b.get() + size));
        unsafe { alloc(Layout::from_size_align(size, 16).unwrap()).cast() }
    }

    unsafe extern "C" fn host_release(base: *mut c_void, size: usize, _: *mut c_void) {
        HOST_BYTES.with(|b| b.set(b.get() - size));
        unsafe { dealloc(base.cast(), Layout::from_size_align(size, 16).unwrap()) };
    }

    #[test]
    fn host_source_receives_chunk_traffic() {
        let cfg = CairnHeapConfig {
            acquire: Some(host_acquire),
            release: Some(host_release),
            source_user_data: 0xC0FFEE as *mut c_void,
            ..small_config()
        };
        let heap = create(&cfg);
        unsafe {
            for _ in 0..3 {
                assert!(!cairn_reallocate(ptr::null_mut(), 1000, heap.cast()).is_null());
            }
            assert_eq!(HOST_BYTES.with(Cell::get), 3 * 1024);
            assert_eq!(cairn_heap_destroy(heap), 0);
        }
        assert_eq!(HOST_BYTES.with(Cell::get), 0);
    }
}
