//! Workload profiles for benchmarking the Cairn script heap.
//!
//! A [`Workload`] is a deterministic trace of reallocate-hook calls shaped
//! like the traffic of an embedded script interpreter:
//!
//! - [`script_profile`]: many short-lived small objects (strings, closures,
//!   maps) with a few long-lived ones and growing lists
//! - [`growth_profile`]: a handful of buffers doubling in size, as a
//!   dynamic array or string builder would
//!
//! [`replay`] feeds a trace through [`Heap::reallocate`].

#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use cairn_arena::{ChunkSource, Heap};

/// One hook call, addressed by slot instead of pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// `reallocate(null, size)` into `slot`.
    Allocate { slot: usize, size: usize },
    /// `reallocate(slot, size)`.
    Resize { slot: usize, size: usize },
    /// `reallocate(slot, 0)`.
    Release { slot: usize },
}

/// A deterministic hook trace.
#[derive(Clone, Debug)]
pub struct Workload {
    /// Number of pointer slots the trace uses.
    pub slots: usize,
    /// The calls, in order.
    pub ops: Vec<Op>,
}

/// Linear congruential step; the trace only needs to be reproducible.
fn next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 33
}

/// Size distribution of a script object: mostly small, with a long tail.
fn object_size(state: &mut u64) -> usize {
    match next(state) % 100 {
        0..=59 => 8 + (next(state) % 40) as usize,
        60..=89 => 48 + (next(state) % 200) as usize,
        90..=98 => 256 + (next(state) % 1800) as usize,
        _ => 4096 + (next(state) % 60_000) as usize,
    }
}

/// Short-lived object churn over `slots` live slots, `n_ops` calls long.
///
/// Roughly half the calls allocate, a third release, the rest resize.
/// Every slot is released at the end, so a replay leaves no live blocks.
pub fn script_profile(seed: u64, slots: usize, n_ops: usize) -> Workload {
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    let mut live = vec![false; slots];
    let mut sizes = vec![0usize; slots];
    let mut ops = Vec::with_capacity(n_ops + slots);

    for _ in 0..n_ops {
        let slot = (next(&mut state) % slots as u64) as usize;
        let roll = next(&mut state) % 6;
        let op = match (live[slot], roll) {
            (false, _) => {
                let size = object_size(&mut state);
                live[slot] = true;
                sizes[slot] = size;
                Op::Allocate { slot, size }
            }
            (true, 0..=2) => {
                live[slot] = false;
                Op::Release { slot }
            }
            (true, _) => {
                let size = (sizes[slot] + sizes[slot] / 2 + 8).min(64 * 1024);
                sizes[slot] = size;
                Op::Resize { slot, size }
            }
        };
        ops.push(op);
    }
    for (slot, alive) in live.into_iter().enumerate() {
        if alive {
            ops.push(Op::Release { slot });
        }
    }
    Workload { slots, ops }
}

/// `buffers` buffers each doubling from 16 bytes up to `max_size`.
pub fn growth_profile(buffers: usize, max_size: usize) -> Workload {
    let mut ops = Vec::new();
    for slot in 0..buffers {
        ops.push(Op::Allocate { slot, size: 16 });
    }
    let mut size = 32;
    while size <= max_size {
        for slot in 0..buffers {
            ops.push(Op::Resize { slot, size });
        }
        size *= 2;
    }
    for slot in 0..buffers {
        ops.push(Op::Release { slot });
    }
    Workload {
        slots: buffers,
        ops,
    }
}

/// Run `workload` against `heap` through the reallocate hook.
///
/// Returns the number of calls that returned null.
#[allow(unsafe_code)]
pub fn replay<S: ChunkSource>(heap: &mut Heap<S>, workload: &Workload) -> usize {
    let mut slots = vec![std::ptr::null_mut(); workload.slots];
    let mut refused = 0;
    for op in &workload.ops {
        // SAFETY: every slot is null or a live block of this heap; the
        // trace only resizes or releases slots it allocated.
        unsafe {
            match *op {
                Op::Allocate { slot, size } | Op::Resize { slot, size } => {
                    let p = heap.reallocate(slots[slot], size);
                    if p.is_null() {
                        refused += 1;
                    } else {
                        slots[slot] = p;
                    }
                }
                Op::Release { slot } => {
                    heap.reallocate(slots[slot], 0);
                    slots[slot] = std::ptr::null_mut();
                }
            }
        }
    }
    refused
}
