/*!
 * System Limits and Constants
 *
 * Centralized location for the sizes, thresholds, and magic numbers used by
 * the arena allocator and the buffer chunk pool.
 *
 * - Performance-critical constants are marked with [PERF]
 * - Corruption-detection constants are marked with [SAFETY]
 */

use std::mem::size_of;

// =============================================================================
// ARENA LIMITS
// =============================================================================

/// Largest request served by bump allocation (4KB - 1)
/// Anything larger goes straight to the system allocator and is tracked
/// as a large object
pub const MAX_ALLOC_FROM_POOL: usize = 4096 - 1;

/// Default arena capacity (16KB), header included
pub const DEFAULT_ARENA_SIZE: usize = 16 * 1024;

/// Alignment of every block obtained from the system allocator
pub const ARENA_BLOCK_ALIGNMENT: usize = 16;

/// Bytes reserved at the front of every block for its header stamp
/// Keeps the first bump allocation cache-line aligned
pub const BLOCK_HEADER_SIZE: usize = 64;

/// Smallest accepted arena capacity
/// Header plus room for two word-sized records, rounded to block alignment
pub const MIN_ARENA_SIZE: usize =
    (BLOCK_HEADER_SIZE + 4 * size_of::<usize>() + ARENA_BLOCK_ALIGNMENT - 1)
        & !(ARENA_BLOCK_ALIGNMENT - 1);

/// Word alignment used by aligned bump allocations
pub const ARENA_ALIGNMENT: usize = size_of::<usize>();

/// Failed scans a block may absorb before the arena stops scanning it
/// [PERF] Trades a little tail waste in nearly-full blocks for O(1) scans
pub const BLOCK_FAILURE_LIMIT: u32 = 5;

/// Number of large-object records (from the head) checked for a free slot
/// before a new record is added
pub const LARGE_REUSE_SCAN: usize = 4;

/// Block header stamp
/// [SAFETY] Checked by `Arena::verify`
pub const BLOCK_MAGIC: u64 = 0x6e65_746d_656d_626b;

// =============================================================================
// BUFFER CHUNK LIMITS
// =============================================================================

/// Chunk canary stamped in the trailer of every chunk's storage
/// [SAFETY] Checked on acquire and release
pub const CHUNK_MAGIC: u32 = 0xdead_beef;

/// Bytes at the end of a chunk's storage holding the canary
pub const CHUNK_TRAILER_SIZE: usize = size_of::<u32>();

/// Smallest chunk size a pool accepts (512B)
pub const CHUNK_MIN_SIZE: usize = 512;

/// Largest chunk size a pool accepts (16MB)
pub const CHUNK_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Default chunk size (16KB)
/// [PERF] Matches a typical socket read size
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Alignment of chunk storage
pub const CHUNK_ALIGNMENT: usize = 16;
