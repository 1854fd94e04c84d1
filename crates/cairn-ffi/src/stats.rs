//! C-compatible allocation statistics.

use cairn_core::AllocStats;

use crate::heap::CairnHeap;
use crate::status::CairnStatus;

/// C-compatible snapshot of a heap's counters.
///
/// Every field is a fixed-width `u64` for ABI portability (not `usize`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CairnAllocStats {
    /// Blocks currently handed out.
    pub live_allocations: u64,
    /// Sum of the full sizes of all live blocks, in bytes.
    pub bytes_in_use: u64,
    /// Nodes currently in the free list.
    pub free_list_nodes: u64,
    /// Highest `live_allocations` ever observed.
    pub peak_live_allocations: u64,
    /// Highest `bytes_in_use` ever observed.
    pub peak_bytes_in_use: u64,
    /// Highest `free_list_nodes` ever observed.
    pub peak_free_list_nodes: u64,
    /// Cumulative blocks handed out.
    pub total_allocations: u64,
    /// Cumulative blocks released.
    pub total_releases: u64,
    /// Resizes that moved the payload.
    pub moving_resizes: u64,
    /// Resizes absorbed in place.
    pub in_place_resizes: u64,
    /// Chunks acquired from the source.
    pub chunk_count: u64,
    /// Bytes acquired from the source.
    pub heap_bytes: u64,
}

// Compile-time layout assertions for ABI stability.
// 12×u64 = 96 bytes, align 8.
const _: () = assert!(std::mem::size_of::<CairnAllocStats>() == 96);
const _: () = assert!(std::mem::align_of::<CairnAllocStats>() == 8);

impl From<&AllocStats> for CairnAllocStats {
    fn from(s: &AllocStats) -> Self {
        Self {
            live_allocations: s.live_allocations as u64,
            bytes_in_use: s.bytes_in_use as u64,
            free_list_nodes: s.free_list_nodes as u64,
            peak_live_allocations: s.peak_live_allocations as u64,
            peak_bytes_in_use: s.peak_bytes_in_use as u64,
            peak_free_list_nodes: s.peak_free_list_nodes as u64,
            total_allocations: s.total_allocations,
            total_releases: s.total_releases,
            moving_resizes: s.moving_resizes,
            in_place_resizes: s.in_place_resizes,
            chunk_count: s.chunk_count as u64,
            heap_bytes: s.heap_bytes as u64,
        }
    }
}

/// Write a snapshot of the heap's counters to `stats_out`.
///
/// # Safety
///
/// `heap` must be null or a live heap; `stats_out` must be null or valid
/// for writes.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn cairn_heap_stats(
    heap: *const CairnHeap,
    stats_out: *mut CairnAllocStats,
) -> i32 {
    ffi_guard!({
        // SAFETY: heap is null or live per caller contract.
        let Some(heap) = (unsafe { heap.as_ref() }) else {
            return CairnStatus::InvalidHandle as i32;
        };
        if stats_out.is_null() {
            return CairnStatus::InvalidArgument as i32;
        }
        let stats = CairnAllocStats::from(&heap.heap.stats());
        // SAFETY: stats_out is non-null and valid per caller contract.
        unsafe { stats_out.write(stats) };
        CairnStatus::Ok as i32
    })
}
