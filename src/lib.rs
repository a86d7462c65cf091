/*!
 * netmem
 * Request-scoped arenas and recyclable I/O buffer chunks for network servers
 *
 * Two independent facilities:
 * - [`Arena`]: bump allocation for many small, short-lived objects tied to
 *   one request or connection, with large-object tracking and cleanup
 *   handlers run at teardown.
 * - [`ChunkPool`]: a free list of fixed-size byte chunks that cycle between
 *   [`ChunkChain`]s and the pool instead of returning to the system
 *   allocator.
 *
 * Neither is internally synchronized. [`SharedChunkPool`] wraps a pool in
 * a lock for callers that share one across threads.
 */

pub mod buffer;
pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use buffer::{Chunk, ChunkChain, ChunkPool, ChunkPoolStats, SharedChunkPool};
pub use crate::core::{ArenaConfig, ChunkPoolConfig, InvariantViolation, MemConfig, MemError, MemResult};
pub use memory::{
    AllocatorStats, Arena, ArenaStats, CleanupHandle, CleanupId, Heap, SystemAllocator,
    TrackingAllocator,
};
pub use monitoring::init_tracing;
