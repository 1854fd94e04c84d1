//! Allocation statistics for host-side diagnostics.
//!
//! [`AllocStats`] is a plain snapshot. The heap keeps one instance up to
//! date on every call and hands out copies on request.

/// Running allocation counters and their historical peaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Number of blocks currently handed out.
    pub live_allocations: usize,
    /// Sum of the full sizes of all live blocks, in bytes.
    pub bytes_in_use: usize,
    /// Number of nodes currently in the free list.
    pub free_list_nodes: usize,
    /// Highest `live_allocations` ever observed.
    pub peak_live_allocations: usize,
    /// Highest `bytes_in_use` ever observed.
    pub peak_bytes_in_use: usize,
    /// Highest `free_list_nodes` ever observed.
    pub peak_free_list_nodes: usize,
    /// Cumulative number of blocks handed out.
    pub total_allocations: u64,
    /// Cumulative number of blocks released.
    pub total_releases: u64,
    /// Resizes that had to move the payload to a new block.
    pub moving_resizes: u64,
    /// Resizes absorbed by the existing block's rounding slack.
    pub in_place_resizes: u64,
    /// Number of chunks acquired from the chunk source.
    pub chunk_count: usize,
    /// Total bytes acquired from the chunk source.
    pub heap_bytes: usize,
}

impl AllocStats {
    /// Record a block of `block_size` bytes being handed out.
    pub fn record_allocation(&mut self, block_size: usize) {
        self.live_allocations += 1;
        self.bytes_in_use += block_size;
        self.total_allocations += 1;
        self.peak_live_allocations = self.peak_live_allocations.max(self.live_allocations);
        self.peak_bytes_in_use = self.peak_bytes_in_use.max(self.bytes_in_use);
    }

    /// Record a block of `block_size` bytes being returned.
    pub fn record_release(&mut self, block_size: usize) {
        debug_assert!(self.live_allocations > 0, "release without live allocation");
        debug_assert!(self.bytes_in_use >= block_size, "bytes_in_use underflow");
        self.live_allocations -= 1;
        self.bytes_in_use -= block_size;
        self.total_releases += 1;
    }

    /// Record the current free-list length.
    pub fn record_free_list_len(&mut self, nodes: usize) {
        self.free_list_nodes = nodes;
        self.peak_free_list_nodes = self.peak_free_list_nodes.max(nodes);
    }

    /// Record a new chunk of `chunk_size` bytes.
    pub fn record_chunk(&mut self, chunk_size: usize) {
        self.chunk_count += 1;
        self.heap_bytes += chunk_size;
    }

    /// Record the outcome of a resize that kept its pointer (`moved == false`)
    /// or relocated the payload (`moved == true`).
    pub fn record_resize(&mut self, moved: bool) {
        if moved {
            self.moving_resizes += 1;
        } else {
            self.in_place_resizes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let s = AllocStats::default();
        assert_eq!(s.live_allocations, 0);
        assert_eq!(s.bytes_in_use, 0);
        assert_eq!(s.free_list_nodes, 0);
        assert_eq!(s.peak_live_allocations, 0);
        assert_eq!(s.peak_bytes_in_use, 0);
        assert_eq!(s.chunk_count, 0);
    }

    #[test]
    fn peaks_survive_releases() {
        let mut s = AllocStats::default();
        s.record_allocation(16);
        s.record_allocation(64);
        s.record_release(16);
        assert_eq!(s.live_allocations, 1);
        assert_eq!(s.bytes_in_use, 64);
        assert_eq!(s.peak_live_allocations, 2);
        assert_eq!(s.peak_bytes_in_use, 80);
        assert_eq!(s.total_allocations, 2);
        assert_eq!(s.total_releases, 1);
    }

    #[test]
    fn free_list_peak_tracks_maximum() {
        let mut s = AllocStats::default();
        s.record_free_list_len(3);
        s.record_free_list_len(1);
        assert_eq!(s.free_list_nodes, 1);
        assert_eq!(s.peak_free_list_nodes, 3);
    }

    #[test]
    fn resize_outcomes_counted_separately() {
        let mut s = AllocStats::default();
        s.record_resize(true);
        s.record_resize(false);
        s.record_resize(false);
        assert_eq!(s.moving_resizes, 1);
        assert_eq!(s.in_place_resizes, 2);
    }

    #[test]
    fn chunks_accumulate_heap_bytes() {
        let mut s = AllocStats::default();
        s.record_chunk(1024);
        s.record_chunk(1024);
        assert_eq!(s.chunk_count, 2);
        assert_eq!(s.heap_bytes, 2048);
    }
}
