//! Drive a heap through the reallocate hook the way a script runtime would.
//!
//! Run with `RUST_LOG=cairn_arena=trace` to see every chunk and resize.

use std::ffi::c_void;
use std::ptr;

use cairn::prelude::*;
use tracing_subscriber::EnvFilter;

type Hook = unsafe extern "C" fn(*mut c_void, usize, *mut c_void) -> *mut c_void;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = HeapConfig::new(64 * 1024);
    config.validate()?;
    let mut heap = Heap::new(config)?;
    let hook: Hook = reallocate_trampoline::<SystemChunkSource>;
    let user_data = (&mut heap as *mut Heap).cast::<c_void>();

    // A table that grows one entry at a time, plus a string per entry.
    let mut table: *mut c_void = ptr::null_mut();
    let mut strings = Vec::new();
    for i in 1..=200usize {
        unsafe {
            table = hook(table, i * std::mem::size_of::<usize>(), user_data);
            let s = hook(ptr::null_mut(), 16 + i % 48, user_data);
            assert!(!table.is_null() && !s.is_null());
            strings.push(s);
        }
    }
    tracing::info!(stats = ?heap.stats(), chunks = heap.chunk_count(), "table built");

    // Drop every other string; the free list absorbs the holes.
    for s in strings.iter().step_by(2) {
        unsafe { hook(*s, 0, user_data) };
    }
    tracing::info!(free_ranges = heap.free_ranges().count(), "half the strings released");

    for s in strings.iter().skip(1).step_by(2) {
        unsafe { hook(*s, 0, user_data) };
    }
    unsafe { hook(table, 0, user_data) };

    let stats = heap.stats();
    tracing::info!(
        total = stats.total_allocations,
        moved = stats.moving_resizes,
        in_place = stats.in_place_resizes,
        peak = stats.peak_bytes_in_use,
        "done"
    );
    Ok(())
}
