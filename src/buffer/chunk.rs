/*!
 * Buffer Chunk
 * Fixed-size byte region with a read cursor and a write cursor
 *
 * ```text
 *   <------------------------ chunk_size ------------------------>
 *   +------------+------------------+---------------+------------+
 *   |  consumed  |      data        |   freespace   |   canary   |
 *   +------------+------------------+---------------+------------+
 *   ^            ^                  ^               ^
 *   start        pos                last            capacity
 * ```
 *
 * `0 <= pos <= last <= capacity` holds at every step; both cursors are
 * offsets from the start of the storage.
 */

use crate::core::errors::{InvariantViolation, MemError, MemResult};
use crate::core::limits::{CHUNK_ALIGNMENT, CHUNK_MAGIC, CHUNK_TRAILER_SIZE};
use crate::core::types::ranges_overlap;
use crate::memory::allocator::Heap;
use crate::memory::traits::SystemAllocator;
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

/// One buffer chunk, owning its storage
///
/// Chunks come from a [`ChunkPool`](super::pool::ChunkPool) and go back to
/// it with `release`. A chunk dropped anywhere else frees its storage
/// through the allocator it was created with.
pub struct Chunk<A: SystemAllocator = Heap> {
    storage: NonNull<u8>,
    chunk_size: usize,
    pos: usize,
    last: usize,
    allocator: A,
}

// SAFETY: the chunk is the sole owner of its storage; nothing else holds
// the pointer
unsafe impl<A: SystemAllocator + Send> Send for Chunk<A> {}

impl<A: SystemAllocator> Chunk<A> {
    /// Allocate `chunk_size` bytes and stamp the canary
    pub(crate) fn allocate(allocator: A, chunk_size: usize) -> MemResult<Self> {
        debug_assert!(chunk_size > CHUNK_TRAILER_SIZE);

        let layout = Self::layout(chunk_size)?;
        let storage = allocator.allocate(layout)?;

        let chunk = Self {
            storage,
            chunk_size,
            pos: 0,
            last: 0,
            allocator,
        };
        chunk.write_canary();
        Ok(chunk)
    }

    fn layout(chunk_size: usize) -> MemResult<Layout> {
        Layout::from_size_align(chunk_size, CHUNK_ALIGNMENT).map_err(|_| MemError::OutOfMemory {
            requested: chunk_size,
        })
    }

    fn trailer(&self) -> *mut u8 {
        // SAFETY: capacity() < chunk_size, so the trailer lies inside the
        // allocation
        unsafe { self.storage.as_ptr().add(self.capacity()) }
    }

    fn write_canary(&self) {
        // SAFETY: the trailer has CHUNK_TRAILER_SIZE bytes and is never
        // exposed through the slice accessors
        unsafe { (self.trailer() as *mut u32).write_unaligned(CHUNK_MAGIC) }
    }

    /// Check the trailer still holds the canary
    pub fn verify_canary(&self) -> Result<(), InvariantViolation> {
        // SAFETY: see write_canary
        let found = unsafe { (self.trailer() as *const u32).read_unaligned() };
        if found != CHUNK_MAGIC {
            return Err(InvariantViolation::CanaryMismatch {
                address: self.trailer() as usize,
                expected: CHUNK_MAGIC as u64,
                found: found as u64,
            });
        }
        Ok(())
    }

    /// Size of the underlying allocation, canary included
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Usable bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.chunk_size - CHUNK_TRAILER_SIZE
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.last
    }

    /// Unread bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.last - self.pos
    }

    /// Bytes that can still be appended
    #[inline]
    pub fn freespace(&self) -> usize {
        self.capacity() - self.last
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == self.last
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.last == self.capacity()
    }

    /// Start of the storage
    pub fn as_ptr(&self) -> *const u8 {
        self.storage.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.storage.as_ptr()
    }

    /// Empty the chunk: `pos = last = 0`
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.last = 0;
    }

    /// Copy `bytes` in at `last`
    ///
    /// Fails with `SelfAliasingCopy` if `bytes` points into this chunk's own
    /// storage, or `CapacityOverrun` if they do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> MemResult<()> {
        if ranges_overlap(
            bytes.as_ptr() as usize,
            bytes.len(),
            self.storage.as_ptr() as usize,
            self.chunk_size,
        ) {
            return Err(InvariantViolation::SelfAliasingCopy.into());
        }

        let available = self.freespace();
        if bytes.len() > available {
            return Err(InvariantViolation::CapacityOverrun {
                requested: bytes.len(),
                available,
            }
            .into());
        }

        // SAFETY: last + len <= capacity and the ranges are disjoint
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.storage.as_ptr().add(self.last),
                bytes.len(),
            );
        }
        self.last += bytes.len();
        Ok(())
    }

    /// Unread bytes, `[pos, last)`
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: pos <= last <= capacity; bytes below last were written
        // by append or declared initialized by commit
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr().add(self.pos), self.len()) }
    }

    /// Writable tail, `[last, capacity)`
    ///
    /// Fill it (e.g. from a socket read) and then `commit` the byte count.
    /// The contents are unspecified until written.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        // SAFETY: the range lies inside the allocation and excludes the
        // canary trailer; u8 has no invalid bit patterns
        unsafe {
            std::slice::from_raw_parts_mut(self.storage.as_ptr().add(self.last), self.freespace())
        }
    }

    /// Mark `n` bytes of the spare region as written
    pub fn commit(&mut self, n: usize) -> MemResult<()> {
        let available = self.freespace();
        if n > available {
            return Err(InvariantViolation::CapacityOverrun {
                requested: n,
                available,
            }
            .into());
        }
        self.last += n;
        Ok(())
    }

    /// Mark `n` unread bytes as consumed
    pub fn consume(&mut self, n: usize) -> MemResult<()> {
        let available = self.len();
        if n > available {
            return Err(InvariantViolation::CapacityOverrun {
                requested: n,
                available,
            }
            .into());
        }
        self.pos += n;
        Ok(())
    }

    /// Drop everything from `cut` on; caller guarantees `pos <= cut <= last`
    pub(crate) fn truncate(&mut self, cut: usize) {
        debug_assert!(self.pos <= cut && cut <= self.last);
        self.last = cut;
    }
}

impl<A: SystemAllocator> Drop for Chunk<A> {
    fn drop(&mut self) {
        if let Ok(layout) = Self::layout(self.chunk_size) {
            // SAFETY: storage came from this allocator with this layout
            unsafe { self.allocator.deallocate(self.storage, layout) }
        }
    }
}

impl<A: SystemAllocator> fmt::Debug for Chunk<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("storage", &self.storage)
            .field("chunk_size", &self.chunk_size)
            .field("pos", &self.pos)
            .field("last", &self.last)
            .finish()
    }
}
