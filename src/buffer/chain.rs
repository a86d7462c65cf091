/*!
 * Chunk Chain
 * Ordered sequence of chunks making up one logical byte stream
 */

use super::chunk::Chunk;
use super::pool::ChunkPool;
use crate::core::errors::MemResult;
use crate::memory::allocator::Heap;
use crate::memory::traits::SystemAllocator;
use std::collections::VecDeque;

/// Chunks in stream order; the tail is the one being written
///
/// The chain owns its chunks. A chunk has to be taken out (`pop_front`,
/// `remove`) before it can be handed back to a pool.
#[derive(Debug)]
pub struct ChunkChain<A: SystemAllocator = Heap> {
    chunks: VecDeque<Chunk<A>>,
}

impl<A: SystemAllocator> Default for ChunkChain<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SystemAllocator> ChunkChain<A> {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
        }
    }

    /// Insert at the tail
    pub fn push_back(&mut self, chunk: Chunk<A>) {
        self.chunks.push_back(chunk);
    }

    pub fn pop_front(&mut self) -> Option<Chunk<A>> {
        self.chunks.pop_front()
    }

    pub fn remove(&mut self, index: usize) -> Option<Chunk<A>> {
        self.chunks.remove(index)
    }

    pub fn front(&self) -> Option<&Chunk<A>> {
        self.chunks.front()
    }

    pub fn tail(&self) -> Option<&Chunk<A>> {
        self.chunks.back()
    }

    pub fn tail_mut(&mut self) -> Option<&mut Chunk<A>> {
        self.chunks.back_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk<A>> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Unread bytes across every chunk
    pub fn total_len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Concatenate the unread bytes of every chunk
    pub fn copy_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk.as_slice());
        }
        out
    }
}

impl<A: SystemAllocator + Clone> ChunkChain<A> {
    /// Hand every chunk back to `pool`, front first
    ///
    /// All chunks are released even if some are rejected; the first error
    /// is returned.
    pub fn release_all(&mut self, pool: &mut ChunkPool<A>) -> MemResult<()> {
        let mut first_err = None;
        while let Some(chunk) = self.chunks.pop_front() {
            if let Err(e) = pool.release(chunk) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
