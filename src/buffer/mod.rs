/*!
 * Buffer Module
 * Recyclable I/O buffer chunks, their pool and chains
 */

pub mod chain;
pub mod chunk;
pub mod pool;
pub mod shared;

// Re-export for convenience
pub use chain::ChunkChain;
pub use chunk::Chunk;
pub use pool::{ChunkPool, ChunkPoolStats};
pub use shared::SharedChunkPool;
