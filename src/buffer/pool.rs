/*!
 * Chunk Pool
 * LIFO free list of equal-size buffer chunks
 *
 * Chunks are recycled as-is: a chunk popped from the free list keeps the
 * cursors it had when released, and callers rewind it if they need an
 * empty one. Every chunk crossing the pool boundary has its canary
 * checked; a chunk that fails is freed rather than pooled.
 */

use super::chain::ChunkChain;
use super::chunk::Chunk;
use crate::core::config::ChunkPoolConfig;
use crate::core::errors::{InvariantViolation, MemError, MemResult};
use crate::memory::allocator::Heap;
use crate::memory::traits::SystemAllocator;
use crate::monitoring::tracer::pool_span;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, warn, Span};

/// Chunk pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPoolStats {
    pub chunk_size: usize,
    /// Chunks obtained from the system allocator
    pub allocated: usize,
    /// Acquires served from the free list
    pub recycled: usize,
    /// Chunks accepted back into the free list
    pub released: usize,
    /// Chunks freed by the pool (rejected or torn down)
    pub freed: usize,
    pub free_chunks: usize,
}

impl ChunkPoolStats {
    /// Share of acquires served without touching the system allocator
    pub fn hit_rate(&self) -> f64 {
        let acquires = self.allocated + self.recycled;
        if acquires == 0 {
            return 0.0;
        }
        (self.recycled as f64 / acquires as f64) * 100.0
    }
}

/// Free list of `chunk_size`-byte chunks
pub struct ChunkPool<A: SystemAllocator + Clone = Heap> {
    free: Vec<Chunk<A>>,
    chunk_size: usize,
    allocator: A,
    stats: ChunkPoolStats,
    span: Span,
}

impl ChunkPool<Heap> {
    /// Pool of `chunk_size`-byte chunks on the global allocator
    pub fn new(chunk_size: usize) -> MemResult<Self> {
        Self::with_config(
            ChunkPoolConfig::with_chunk_size(chunk_size),
            Heap,
            pool_span(chunk_size),
        )
    }
}

impl<A: SystemAllocator + Clone> ChunkPool<A> {
    /// Pool backed by `allocator`, logging under `span`
    pub fn with_config(config: ChunkPoolConfig, allocator: A, span: Span) -> MemResult<Self> {
        config.validate()?;

        debug!(
            parent: &span,
            chunk_size = config.chunk_size,
            "Chunk pool initialized"
        );

        Ok(Self {
            free: Vec::new(),
            chunk_size: config.chunk_size,
            allocator,
            stats: ChunkPoolStats {
                chunk_size: config.chunk_size,
                ..ChunkPoolStats::default()
            },
            span,
        })
    }

    /// Take a chunk from the free list, or allocate a fresh empty one
    pub fn acquire(&mut self) -> MemResult<Chunk<A>> {
        if let Some(chunk) = self.free.pop() {
            if let Err(violation) = chunk.verify_canary() {
                error!(parent: &self.span, %violation, "Pooled chunk corrupted");
                self.stats.freed += 1;
                drop(chunk);
                return Err(violation.into());
            }

            self.stats.recycled += 1;
            debug!(
                parent: &self.span,
                address = format!("{:p}", chunk.as_ptr()),
                free = self.free.len(),
                "Acquired chunk from pool"
            );
            return Ok(chunk);
        }

        let chunk = Chunk::allocate(self.allocator.clone(), self.chunk_size)?;
        self.stats.allocated += 1;
        debug!(
            parent: &self.span,
            address = format!("{:p}", chunk.as_ptr()),
            chunk_size = self.chunk_size,
            "Allocated new chunk"
        );
        Ok(chunk)
    }

    /// Make room for `additional` more chunks in the free list
    ///
    /// Releases within the reserved room never allocate.
    pub fn reserve(&mut self, additional: usize) -> MemResult<()> {
        self.free
            .try_reserve(additional)
            .map_err(|_| MemError::OutOfMemory {
                requested: additional.saturating_mul(std::mem::size_of::<Chunk<A>>()),
            })
    }

    /// Return a chunk to the head of the free list
    ///
    /// A chunk with a damaged canary or a foreign size is freed and the
    /// violation returned. If the free list cannot grow, the chunk is freed
    /// and `OutOfMemory` returned.
    pub fn release(&mut self, chunk: Chunk<A>) -> MemResult<()> {
        if chunk.chunk_size() != self.chunk_size {
            let violation = InvariantViolation::ChunkSizeMismatch {
                expected: self.chunk_size,
                actual: chunk.chunk_size(),
            };
            error!(parent: &self.span, %violation, "Rejected chunk release");
            self.stats.freed += 1;
            return Err(violation.into());
        }

        if let Err(violation) = chunk.verify_canary() {
            error!(parent: &self.span, %violation, "Rejected chunk release");
            self.stats.freed += 1;
            return Err(violation.into());
        }

        if let Err(e) = self.reserve(1) {
            warn!(parent: &self.span, error = %e, "Free list cannot grow, freeing chunk");
            self.stats.freed += 1;
            return Err(e);
        }

        debug!(
            parent: &self.span,
            address = format!("{:p}", chunk.as_ptr()),
            "Released chunk to pool"
        );
        self.free.push(chunk);
        self.stats.released += 1;
        Ok(())
    }

    /// Move the bytes from `cut` onwards in the chain's tail into a new chunk
    ///
    /// The new chunk is acquired from this pool and rewound, `init` runs on
    /// it (e.g. to write a header), then the tail's `[cut, last)` is
    /// appended and the tail truncated to `cut`. On any failure the new
    /// chunk goes back to the pool and the tail is left untouched.
    pub fn split<F>(
        &mut self,
        chain: &mut ChunkChain<A>,
        cut: usize,
        init: F,
    ) -> MemResult<Chunk<A>>
    where
        F: FnOnce(&mut Chunk<A>) -> MemResult<()>,
    {
        let tail = chain.tail_mut().ok_or(InvariantViolation::EmptyChain)?;
        if cut < tail.pos() || cut > tail.last() {
            return Err(InvariantViolation::CutOutOfRange {
                cut,
                pos: tail.pos(),
                last: tail.last(),
            }
            .into());
        }

        let mut chunk = self.acquire()?;
        chunk.rewind();

        let filled = init(&mut chunk).and_then(|()| {
            let suffix = &tail.as_slice()[cut - tail.pos()..];
            chunk.append(suffix)
        });

        if let Err(e) = filled {
            debug!(parent: &self.span, error = %e, cut = cut, "Split aborted");
            if let Err(release_err) = self.release(chunk) {
                warn!(parent: &self.span, error = %release_err, "Split chunk not returned");
            }
            return Err(e);
        }

        tail.truncate(cut);
        debug!(
            parent: &self.span,
            cut = cut,
            moved = chunk.len(),
            "Split chain tail"
        );
        Ok(chunk)
    }

    /// Chunks currently pooled
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn stats(&self) -> ChunkPoolStats {
        ChunkPoolStats {
            free_chunks: self.free.len(),
            ..self.stats
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Free every pooled chunk and tear the pool down
    pub fn deinit(self) {
        debug!(parent: &self.span, "Chunk pool deinit requested");
        drop(self);
    }
}

impl<A: SystemAllocator + Clone> Drop for ChunkPool<A> {
    fn drop(&mut self) {
        let pooled = self.free.len();
        self.free.clear();
        self.stats.freed += pooled;
        debug!(
            parent: &self.span,
            freed = pooled,
            allocated = self.stats.allocated,
            "Chunk pool torn down"
        );
    }
}

impl<A: SystemAllocator + Clone> fmt::Debug for ChunkPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkPool").field("stats", &self.stats()).finish()
    }
}
