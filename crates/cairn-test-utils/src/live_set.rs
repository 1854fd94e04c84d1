//! Model of the blocks a heap currently has handed out.
//!
//! Every block registered with [`LiveSet::insert`] is stamped with a byte
//! pattern over its requested length, and its full footprint (guards and
//! header included) is checked against every other live block. [`LiveSet::verify_all`] re-reads the
//! patterns, so a heap that hands out overlapping blocks, scribbles over a
//! live payload, or loses data on a moving resize is caught.

use std::ptr::NonNull;

use cairn_core::layout::{BLOCK_OVERHEAD, HEADER_BYTES, PAYLOAD_OFFSET};
use indexmap::IndexMap;

/// One tracked block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveBlock {
    pub ptr: NonNull<u8>,
    pub len: usize,
    pub pattern: u8,
    /// Full block size read from the header when the block was registered.
    pub block_size: usize,
}

impl LiveBlock {
    fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Raw block extent: from the leading guard to past the trailing guard.
    pub fn extent(&self) -> (usize, usize) {
        let start = self.addr() - PAYLOAD_OFFSET;
        (start, start + self.block_size)
    }

    fn overlaps(&self, other: (usize, usize)) -> bool {
        let (a0, a1) = self.extent();
        a0 < other.1 && other.0 < a1
    }
}

/// Read the size header in front of a payload.
#[allow(unsafe_code)]
fn header_size(ptr: NonNull<u8>) -> usize {
    // SAFETY: every payload handed to a LiveSet is preceded by its block
    // header, which lies in the same allocation.
    let size = unsafe { ptr.as_ptr().sub(HEADER_BYTES).cast::<u32>().read_unaligned() };
    size as usize
}

/// Live blocks keyed by payload address, in insertion order.
#[derive(Debug, Default)]
pub struct LiveSet {
    blocks: IndexMap<usize, LiveBlock>,
    next_pattern: u8,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of the requested lengths of every live block.
    pub fn requested_bytes(&self) -> usize {
        self.blocks.values().map(|b| b.len).sum()
    }

    /// Register a fresh block of `len` requested bytes and stamp it.
    ///
    /// # Panics
    ///
    /// If the block's footprint overlaps that of a block already in the set.
    #[allow(unsafe_code)]
    pub fn insert(&mut self, ptr: NonNull<u8>, len: usize) {
        let addr = ptr.as_ptr() as usize;
        let mut block = LiveBlock {
            ptr,
            len,
            pattern: 0,
            block_size: header_size(ptr),
        };
        assert!(
            block.block_size >= BLOCK_OVERHEAD + len,
            "block {addr:#x} of {} bytes cannot hold {len} bytes",
            block.block_size
        );
        let extent = block.extent();
        if let Some(other) = self.blocks.values().find(|b| b.overlaps(extent)) {
            let (start, end) = other.extent();
            panic!(
                "block {:#x}..{:#x} overlaps live block {start:#x}..{end:#x}",
                extent.0, extent.1
            );
        }
        block.pattern = self.bump_pattern();
        // SAFETY: the heap handed out at least `len` writable bytes at ptr.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), block.pattern, len) };
        self.blocks.insert(addr, block);
    }

    /// Block at insertion-order position `index`.
    pub fn get_index(&self, index: usize) -> Option<LiveBlock> {
        self.blocks.get_index(index).map(|(_, b)| *b)
    }

    /// Stop tracking the block at position `index` after verifying it.
    pub fn remove_index(&mut self, index: usize) -> Option<LiveBlock> {
        let (_, block) = self.blocks.swap_remove_index(index)?;
        Self::verify(&block);
        Some(block)
    }

    /// Record that `old` was resized to `new_ptr` with `new_len` requested
    /// bytes. Checks the preserved prefix, then re-stamps the block.
    pub fn resized(&mut self, old: LiveBlock, new_ptr: NonNull<u8>, new_len: usize) {
        self.blocks.swap_remove(&old.addr());
        let kept = old.len.min(new_len);
        Self::verify(&LiveBlock {
            ptr: new_ptr,
            len: kept,
            ..old
        });
        self.insert(new_ptr, new_len);
    }

    /// Check every live block still holds its pattern.
    pub fn verify_all(&self) {
        for block in self.blocks.values() {
            Self::verify(block);
        }
    }

    #[allow(unsafe_code)]
    fn verify(block: &LiveBlock) {
        // SAFETY: the block is live and at least `len` bytes long.
        let bytes = unsafe { std::slice::from_raw_parts(block.ptr.as_ptr(), block.len) };
        if let Some(pos) = bytes.iter().position(|&b| b != block.pattern) {
            panic!(
                "block {:#x}: byte {pos} is {:#04x}, expected {:#04x}",
                block.addr(),
                bytes[pos],
                block.pattern
            );
        }
    }

    fn bump_pattern(&mut self) -> u8 {
        // Skip the heap's own fill bytes so stale fills are never mistaken
        // for live data.
        loop {
            self.next_pattern = self.next_pattern.wrapping_add(1);
            if !matches!(self.next_pattern, 0x00 | 0xA5 | 0xEE) {
                return self.next_pattern;
            }
        }
    }

    /// Iterate over the live blocks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveBlock> {
        self.blocks.values()
    }
}
