//! Intrusive, address-ordered free list with adjacency coalescing.
//!
//! Each free range stores its own node (size and forward link) in its first
//! bytes, so the list costs no memory beyond the ranges it tracks. Nodes are
//! kept in strictly increasing address order; [`FreeList::insert`] merges a
//! range with its neighbours when they touch, so no two nodes are ever
//! adjacent.
//!
//! Ranges need not be powers of two (two coalesced 16-byte blocks form a
//! 32-byte range, a 16 and a 32 form 48). Only the blocks carved out by
//! [`FreeList::take`] are.

use std::marker::PhantomData;
use std::ptr::NonNull;

use cairn_core::layout::MIN_BLOCK_SIZE;

use crate::raw::{self, FreeNode};

/// An address-ordered singly linked list of free ranges.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<NonNull<u8>>,
    len: usize,
}

/// One free range, as reported by [`FreeRanges`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeRange {
    /// Address of the first byte of the range.
    pub start: usize,
    /// Length of the range in bytes.
    pub size: usize,
}

impl FreeRange {
    /// One past the last byte of the range.
    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

fn addr(ptr: NonNull<u8>) -> usize {
    ptr.as_ptr() as usize
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Link `start..start + size` into the list, merging with neighbours.
    ///
    /// Two ranges are never merged across an address for which
    /// `is_chunk_base` holds, so a free range never spans two chunks even
    /// when a source hands out contiguous regions.
    ///
    /// # Safety
    ///
    /// The range must lie inside a live chunk, must not overlap any live
    /// block or any range already in the list, and must start on a
    /// [`MIN_BLOCK_SIZE`] boundary with `size` a multiple of it.
    #[allow(unsafe_code)]
    pub unsafe fn insert(
        &mut self,
        start: NonNull<u8>,
        size: usize,
        is_chunk_base: impl Fn(usize) -> bool,
    ) {
        debug_assert!(size >= MIN_BLOCK_SIZE && size % MIN_BLOCK_SIZE == 0);
        debug_assert_eq!(addr(start) % MIN_BLOCK_SIZE, 0);

        let mut prev: Option<(NonNull<u8>, FreeNode)> = None;
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            if addr(node_ptr) > addr(start) {
                break;
            }
            // SAFETY: every linked pointer was written by insert or take.
            let node = unsafe { raw::read_free_node(node_ptr) };
            prev = Some((node_ptr, node));
            cursor = node.next;
        }

        if let Some((p, node)) = prev {
            debug_assert!(addr(p) + node.size <= addr(start), "range overlaps its predecessor");
        }

        let mut merged = FreeNode { size, next: cursor };
        if let Some(next_ptr) = cursor {
            debug_assert!(addr(start) + size <= addr(next_ptr), "range overlaps its successor");
            if addr(start) + size == addr(next_ptr) && !is_chunk_base(addr(next_ptr)) {
                // SAFETY: next_ptr is a linked node.
                let next = unsafe { raw::read_free_node(next_ptr) };
                merged = FreeNode {
                    size: size + next.size,
                    next: next.next,
                };
                self.len -= 1;
            }
        }

        match prev {
            Some((p, node))
                if addr(p) + node.size == addr(start) && !is_chunk_base(addr(start)) =>
            {
                let grown = FreeNode {
                    size: node.size + merged.size,
                    next: merged.next,
                };
                // SAFETY: p is a linked node; the merged range is all free.
                unsafe { raw::write_free_node(p, grown) };
            }
            Some((p, node)) => {
                // SAFETY: start is free per the caller contract; p is linked.
                unsafe {
                    raw::write_free_node(start, merged);
                    raw::write_free_node(
                        p,
                        FreeNode {
                            size: node.size,
                            next: Some(start),
                        },
                    );
                }
                self.len += 1;
            }
            None => {
                // SAFETY: start is free per the caller contract.
                unsafe { raw::write_free_node(start, merged) };
                self.head = Some(start);
                self.len += 1;
            }
        }
    }

    /// Remove and return the first range that can host a `block_size` block.
    ///
    /// A larger range is split: the first `block_size` bytes are returned and
    /// the tail stays linked where the node was. Returns `None` on a miss.
    #[allow(unsafe_code)]
    pub fn take(&mut self, block_size: usize) -> Option<NonNull<u8>> {
        debug_assert!(block_size >= MIN_BLOCK_SIZE && block_size % MIN_BLOCK_SIZE == 0);

        let mut prev: Option<NonNull<u8>> = None;
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            // SAFETY: every linked pointer was written by insert or take.
            let node = unsafe { raw::read_free_node(node_ptr) };
            if node.size >= block_size {
                let replacement = if node.size == block_size {
                    self.len -= 1;
                    node.next
                } else {
                    // SAFETY: block_size < node.size, so the tail is inside
                    // the free range and MIN_BLOCK_SIZE-aligned.
                    let tail = unsafe {
                        let tail = raw::offset(node_ptr, block_size);
                        raw::write_free_node(
                            tail,
                            FreeNode {
                                size: node.size - block_size,
                                next: node.next,
                            },
                        );
                        tail
                    };
                    Some(tail)
                };
                self.relink(prev, replacement);
                return Some(node_ptr);
            }
            prev = Some(node_ptr);
            cursor = node.next;
        }
        None
    }

    #[allow(unsafe_code)]
    fn relink(&mut self, prev: Option<NonNull<u8>>, next: Option<NonNull<u8>>) {
        match prev {
            Some(p) => {
                // SAFETY: p is a linked node.
                unsafe {
                    let mut node = raw::read_free_node(p);
                    node.next = next;
                    raw::write_free_node(p, node);
                }
            }
            None => self.head = next,
        }
    }

    /// Whether `address` falls inside any free range.
    pub fn covers(&self, address: usize) -> bool {
        self.iter()
            .take_while(|r| r.start <= address)
            .any(|r| address < r.end())
    }

    /// Iterate over the free ranges in address order.
    pub fn iter(&self) -> FreeRanges<'_> {
        FreeRanges {
            cursor: self.head,
            _list: PhantomData,
        }
    }
}

/// Address-ordered iterator over the free ranges of a heap.
///
/// Borrows the heap, so the list cannot change while it is being walked.
#[derive(Debug)]
pub struct FreeRanges<'a> {
    cursor: Option<NonNull<u8>>,
    _list: PhantomData<&'a FreeList>,
}

impl Iterator for FreeRanges<'_> {
    type Item = FreeRange;

    #[allow(unsafe_code)]
    fn next(&mut self) -> Option<FreeRange> {
        let node_ptr = self.cursor?;
        // SAFETY: the list is borrowed, so every linked node is still valid.
        let node = unsafe { raw::read_free_node(node_ptr) };
        self.cursor = node.next;
        Some(FreeRange {
            start: addr(node_ptr),
            size: node.size,
        })
    }
}
