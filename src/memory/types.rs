/*!
 * Memory Types
 * Statistics reported by arenas
 */

use serde::{Deserialize, Serialize};

/// Snapshot of an arena's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    /// Size of every block, header included
    pub block_size: usize,
    pub block_count: usize,
    /// Index of the first block scanned by small allocations
    pub current_block: usize,
    pub small_threshold: usize,
    /// Bump-allocated bytes across all blocks, alignment padding included
    pub bytes_used: usize,
    /// Bytes held in blocks, headers included
    pub bytes_reserved: usize,
    /// Large-object records, free slots included
    pub large_records: usize,
    pub large_live: usize,
    pub large_bytes: usize,
    pub cleanup_count: usize,
}

impl ArenaStats {
    /// Fraction of block space handed out, in percent
    pub fn utilization(&self) -> f64 {
        if self.bytes_reserved == 0 {
            return 0.0;
        }
        (self.bytes_used as f64 / self.bytes_reserved as f64) * 100.0
    }
}
