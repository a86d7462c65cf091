/*!
 * Shared Chunk Pool
 * Cloneable, lock-protected handle to one chunk pool
 */

use super::chain::ChunkChain;
use super::chunk::Chunk;
use super::pool::{ChunkPool, ChunkPoolStats};
use crate::core::errors::MemResult;
use crate::memory::allocator::Heap;
use crate::memory::traits::SystemAllocator;
use parking_lot::Mutex;
use std::sync::Arc;

/// Chunk pool shared between threads
///
/// Every operation takes the lock for its own duration only; chunks
/// themselves are owned values and need no locking once acquired.
pub struct SharedChunkPool<A: SystemAllocator + Clone = Heap> {
    inner: Arc<Mutex<ChunkPool<A>>>,
}

impl<A: SystemAllocator + Clone> Clone for SharedChunkPool<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedChunkPool<Heap> {
    pub fn new(chunk_size: usize) -> MemResult<Self> {
        Ok(Self::from_pool(ChunkPool::new(chunk_size)?))
    }
}

impl<A: SystemAllocator + Clone> SharedChunkPool<A> {
    pub fn from_pool(pool: ChunkPool<A>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    pub fn acquire(&self) -> MemResult<Chunk<A>> {
        self.inner.lock().acquire()
    }

    pub fn release(&self, chunk: Chunk<A>) -> MemResult<()> {
        self.inner.lock().release(chunk)
    }

    /// See [`ChunkPool::split`]; `init` runs with the pool locked
    pub fn split<F>(&self, chain: &mut ChunkChain<A>, cut: usize, init: F) -> MemResult<Chunk<A>>
    where
        F: FnOnce(&mut Chunk<A>) -> MemResult<()>,
    {
        self.inner.lock().split(chain, cut, init)
    }

    pub fn release_all(&self, chain: &mut ChunkChain<A>) -> MemResult<()> {
        chain.release_all(&mut self.inner.lock())
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free_count()
    }

    pub fn stats(&self) -> ChunkPoolStats {
        self.inner.lock().stats()
    }

    /// Run `f` with exclusive access to the pool
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut ChunkPool<A>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Number of handles to this pool
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<A: SystemAllocator + Clone> std::fmt::Debug for SharedChunkPool<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChunkPool")
            .field("stats", &self.stats())
            .finish()
    }
}
