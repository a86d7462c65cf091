/*!
 * Memory Block
 * One contiguous region the arena bump-allocates from
 *
 * ```text
 *   <------------------- size ------------------->
 *   +--------------+------------------+-----------+
 *   | BlockHeader  |  allocated data  |   free    |
 *   +--------------+------------------+-----------+
 *   ^              ^                  ^           ^
 *   base           BLOCK_HEADER_SIZE  cursor      end
 * ```
 */

use crate::core::errors::{InvariantViolation, MemError, MemResult};
use crate::core::limits::{ARENA_BLOCK_ALIGNMENT, BLOCK_HEADER_SIZE, BLOCK_MAGIC};
use crate::core::types::align_up;
use crate::memory::traits::SystemAllocator;
use std::alloc::Layout;
use std::ptr::NonNull;

/// Stamp written at the front of every block
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    magic: u64,
    ordinal: u64,
}

const _: () = assert!(std::mem::size_of::<BlockHeader>() <= BLOCK_HEADER_SIZE);

#[derive(Debug)]
pub(super) struct MemoryBlock {
    base: NonNull<u8>,
    size: usize,
    /// Offset of the first free byte; never below `BLOCK_HEADER_SIZE`
    cursor: usize,
    /// Scans that fell through this block to a new one
    failed: u32,
}

impl MemoryBlock {
    /// Reserve a block of `size` bytes (header included)
    pub fn allocate<A: SystemAllocator>(
        allocator: &A,
        size: usize,
        ordinal: usize,
    ) -> MemResult<Self> {
        let layout = Self::layout(size)?;
        let base = allocator.allocate(layout)?;

        // SAFETY: the region is at least BLOCK_HEADER_SIZE bytes and 16-byte
        // aligned, which satisfies BlockHeader's size and alignment
        unsafe {
            base.cast::<BlockHeader>().as_ptr().write(BlockHeader {
                magic: BLOCK_MAGIC,
                ordinal: ordinal as u64,
            });
        }

        Ok(Self {
            base,
            size,
            cursor: BLOCK_HEADER_SIZE,
            failed: 0,
        })
    }

    fn layout(size: usize) -> MemResult<Layout> {
        Layout::from_size_align(size, ARENA_BLOCK_ALIGNMENT)
            .map_err(|_| MemError::OutOfMemory { requested: size })
    }

    /// Carve `size` bytes aligned to `align`, if they fit
    #[inline]
    pub fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.base.as_ptr() as usize;
        let start = align_up(base + self.cursor, align)? - base;
        let end = start.checked_add(size)?;
        if end > self.size {
            return None;
        }

        self.cursor = end;
        // SAFETY: start <= end <= self.size, so the pointer stays inside
        // the block's allocation
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) })
    }

    /// Forget every allocation made from this block
    pub fn reset(&mut self) {
        self.cursor = BLOCK_HEADER_SIZE;
        self.failed = 0;
    }

    /// Count one failed scan; returns the new total
    pub fn record_failure(&mut self) -> u32 {
        self.failed += 1;
        self.failed
    }

    /// Bytes handed out since the last reset, padding included
    pub fn used(&self) -> usize {
        self.cursor - BLOCK_HEADER_SIZE
    }

    pub fn remaining(&self) -> usize {
        self.size - self.cursor
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn verify(&self) -> Result<(), InvariantViolation> {
        // SAFETY: the header was written at construction and the block is
        // still allocated
        let header = unsafe { self.base.cast::<BlockHeader>().as_ptr().read() };
        if header.magic != BLOCK_MAGIC {
            return Err(InvariantViolation::CanaryMismatch {
                address: self.base.as_ptr() as usize,
                expected: BLOCK_MAGIC,
                found: header.magic,
            });
        }
        Ok(())
    }

    /// Return the block's memory to `allocator`
    ///
    /// # Safety
    ///
    /// `allocator` must be the allocator the block was created with, and no
    /// reference into the block may outlive this call.
    pub unsafe fn release<A: SystemAllocator>(self, allocator: &A) {
        let layout = Layout::from_size_align_unchecked(self.size, ARENA_BLOCK_ALIGNMENT);
        allocator.deallocate(self.base, layout);
    }
}
