/*!
 * Memory Module
 * Request arenas and the system allocator seam they draw from
 */

pub mod allocator;
pub mod arena;
pub mod tracking;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use allocator::Heap;
pub use arena::{Arena, CleanupFn, CleanupHandle, CleanupId};
pub use tracking::{AllocatorStats, TrackingAllocator};
pub use traits::SystemAllocator;
pub use types::ArenaStats;
