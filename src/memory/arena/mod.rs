/*!
 * Request Arena
 *
 * Bump allocator for request- and connection-scoped metadata.
 *
 * ## Allocation paths
 *
 * - **Small** (`size <= small_threshold`): bump allocation from a chain of
 *   equally sized blocks. Scanning starts at the *current* block; blocks
 *   that keep failing to satisfy requests are skipped for good (until the
 *   next reset) once their failure count passes `BLOCK_FAILURE_LIMIT`.
 * - **Large** (`size > small_threshold`): served by the system allocator and
 *   tracked in a large-object list so it can be freed individually with
 *   [`Arena::free_large`] or in bulk on reset/destroy.
 *
 * ## Lifecycle
 *
 * - [`Arena::reset`] frees large objects and rewinds every block, keeping the
 *   blocks for reuse. Cleanup handlers are not run.
 * - [`Arena::destroy`] (or drop) runs cleanup handlers newest-first, then
 *   frees large objects and blocks.
 *
 * Allocation takes `&self` and hands out `&mut [u8]` tied to that borrow;
 * reset, `free_large` and destroy take `&mut self`/`self`, so no slice can
 * outlive the memory behind it.
 */

mod block;
mod cleanup;
mod large;

pub use cleanup::{CleanupFn, CleanupHandle, CleanupId};

use super::allocator::Heap;
use super::traits::SystemAllocator;
use super::types::ArenaStats;
use crate::core::config::ArenaConfig;
use crate::core::errors::{InvariantViolation, MemError, MemResult};
use crate::core::limits::{
    ARENA_ALIGNMENT, ARENA_BLOCK_ALIGNMENT, BLOCK_FAILURE_LIMIT, BLOCK_HEADER_SIZE,
    MAX_ALLOC_FROM_POOL,
};
use crate::monitoring::tracer::arena_span;
use block::MemoryBlock;
use cleanup::CleanupEntry;
use large::LargeList;
use std::alloc::Layout;
use std::cell::RefCell;
use std::fmt;
use std::ptr::NonNull;
use tracing::{debug, error, trace, Span};

struct ArenaState {
    /// Growth order; index 0 is the first block ever created
    blocks: Vec<MemoryBlock>,
    /// First block worth scanning; only moves forward until reset
    current: usize,
    large: LargeList,
    /// Registration order; destruction walks it backwards
    cleanups: Vec<CleanupEntry>,
}

/// Request/connection-scoped bump allocator
pub struct Arena<A: SystemAllocator = Heap> {
    state: RefCell<ArenaState>,
    allocator: A,
    block_size: usize,
    small_threshold: usize,
    span: Span,
}

impl Arena<Heap> {
    /// Create an arena whose blocks are `capacity` bytes, header included
    pub fn create(capacity: usize) -> MemResult<Self> {
        Self::with_config(ArenaConfig::with_capacity(capacity), Heap, arena_span(capacity))
    }
}

#[allow(clippy::mut_from_ref)]
impl<A: SystemAllocator> Arena<A> {
    /// Create an arena backed by `allocator`, logging under `span`
    pub fn with_config(config: ArenaConfig, allocator: A, span: Span) -> MemResult<Self> {
        config.validate()?;

        let block_size = config.capacity;
        let first = MemoryBlock::allocate(&allocator, block_size, 0)?;
        let small_threshold = (block_size - BLOCK_HEADER_SIZE).min(MAX_ALLOC_FROM_POOL);

        debug!(
            parent: &span,
            block_size = block_size,
            small_threshold = small_threshold,
            "Arena created"
        );

        Ok(Self {
            state: RefCell::new(ArenaState {
                blocks: vec![first],
                current: 0,
                large: LargeList::new(),
                cleanups: Vec::new(),
            }),
            allocator,
            block_size,
            small_threshold,
            span,
        })
    }

    /// Allocate `size` bytes; `aligned` requests machine-word alignment
    pub fn alloc(&self, size: usize, aligned: bool) -> MemResult<&mut [u8]> {
        let align = if aligned { ARENA_ALIGNMENT } else { 1 };
        self.alloc_bytes(size, align)
    }

    /// Word-aligned allocation, zero filled
    pub fn alloc_zeroed(&self, size: usize) -> MemResult<&mut [u8]> {
        let bytes = self.alloc(size, true)?;
        bytes.fill(0);
        Ok(bytes)
    }

    /// Allocate `size` bytes aligned to `align` (a power of two)
    pub fn alloc_with_align(&self, size: usize, align: usize) -> MemResult<&mut [u8]> {
        if !align.is_power_of_two() {
            return Err(InvariantViolation::InvalidAlignment(align).into());
        }
        self.alloc_bytes(size, align)
    }

    /// Copy `src` into the arena
    pub fn alloc_copy(&self, src: &[u8]) -> MemResult<&mut [u8]> {
        let bytes = self.alloc(src.len(), false)?;
        bytes.copy_from_slice(src);
        Ok(bytes)
    }

    /// Copy a string into the arena
    pub fn alloc_str(&self, s: &str) -> MemResult<&mut str> {
        let bytes = self.alloc_copy(s.as_bytes())?;
        // SAFETY: the bytes were copied from a valid &str
        Ok(unsafe { std::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Move a plain value into the arena
    ///
    /// Restricted to `Copy` types: the arena never runs destructors for what
    /// it holds.
    pub fn alloc_value<T: Copy>(&self, value: T) -> MemResult<&mut T> {
        let layout = Layout::new::<T>();
        let ptr = if layout.size() == 0 {
            NonNull::<T>::dangling()
        } else {
            self.alloc_raw(layout.size(), layout.align())?.cast::<T>()
        };

        // SAFETY: ptr is valid for writes of T and suitably aligned
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    fn alloc_bytes(&self, size: usize, align: usize) -> MemResult<&mut [u8]> {
        if size == 0 {
            return Ok(&mut []);
        }
        let ptr = self.alloc_raw(size, align)?;
        // SAFETY: alloc_raw returns `size` bytes no other live slice covers
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), size) })
    }

    fn alloc_raw(&self, size: usize, align: usize) -> MemResult<NonNull<u8>> {
        if size <= self.small_threshold && align <= ARENA_BLOCK_ALIGNMENT {
            self.alloc_small(size, align)
        } else {
            self.alloc_large(size, align)
        }
    }

    fn alloc_small(&self, size: usize, align: usize) -> MemResult<NonNull<u8>> {
        let mut guard = self.state.borrow_mut();
        let ArenaState {
            blocks, current, ..
        } = &mut *guard;

        let start = *current;
        for block in &mut blocks[start..] {
            if let Some(ptr) = block.bump(size, align) {
                trace!(parent: &self.span, size = size, align = align, "small alloc");
                return Ok(ptr);
            }
        }

        // Nothing from `current` onwards fits: grow the chain
        blocks
            .try_reserve(1)
            .map_err(|_| MemError::OutOfMemory { requested: self.block_size })?;
        let mut block = MemoryBlock::allocate(&self.allocator, self.block_size, blocks.len())?;
        let Some(ptr) = block.bump(size, align) else {
            let available = block.remaining();
            // SAFETY: the block was never shared
            unsafe { block.release(&self.allocator) };
            return Err(InvariantViolation::CapacityOverrun {
                requested: size,
                available,
            }
            .into());
        };

        for (index, scanned) in blocks.iter_mut().enumerate().skip(start) {
            if scanned.record_failure() > BLOCK_FAILURE_LIMIT {
                *current = index + 1;
            }
        }
        blocks.push(block);

        debug!(
            parent: &self.span,
            size = size,
            blocks = blocks.len(),
            current = *current,
            "Arena grew a block"
        );
        Ok(ptr)
    }

    fn alloc_large(&self, size: usize, align: usize) -> MemResult<NonNull<u8>> {
        let layout = Layout::from_size_align(size, align.max(ARENA_ALIGNMENT))
            .map_err(|_| MemError::OutOfMemory { requested: size })?;
        let ptr = self.allocator.allocate(layout)?;

        let mut state = self.state.borrow_mut();
        match state.large.insert(ptr, layout) {
            Ok(reused) => {
                debug!(
                    parent: &self.span,
                    size = size,
                    reused_slot = reused,
                    address = format!("{:p}", ptr),
                    "large alloc"
                );
                Ok(ptr)
            }
            Err(e) => {
                // SAFETY: ptr was just allocated with layout and never exposed
                unsafe { self.allocator.deallocate(ptr, layout) };
                Err(e)
            }
        }
    }

    /// Free one large allocation early
    ///
    /// Returns false if `ptr` is not the start of a live large allocation;
    /// bump allocations are never individually freeable.
    pub fn free_large(&mut self, ptr: *const u8) -> bool {
        let Self {
            state,
            allocator,
            span,
            ..
        } = self;
        match state.get_mut().large.remove(ptr) {
            Some((ptr, layout)) => {
                // SAFETY: the record owned this allocation and `&mut self`
                // guarantees no slice into it is still alive
                unsafe { allocator.deallocate(ptr, layout) };
                debug!(parent: &*span, address = format!("{:p}", ptr), "large free");
                true
            }
            None => false,
        }
    }

    /// Register a cleanup entry with `payload_size` bytes of arena payload
    ///
    /// Payloads above the small threshold get their own allocation, held by
    /// the entry until its handler has run. Reset and [`Arena::free_large`]
    /// never touch it.
    pub fn add_cleanup(&self, payload_size: usize) -> MemResult<CleanupHandle<'_, A>> {
        self.state
            .borrow_mut()
            .cleanups
            .try_reserve(1)
            .map_err(|_| MemError::OutOfMemory {
                requested: std::mem::size_of::<CleanupEntry>(),
            })?;

        let (payload, entry) = if payload_size > self.small_threshold {
            let layout = Layout::from_size_align(payload_size, ARENA_ALIGNMENT)
                .map_err(|_| MemError::OutOfMemory { requested: payload_size })?;
            let ptr = self.allocator.allocate(layout)?;
            // SAFETY: fresh allocation of `payload_size` bytes, freed only by
            // the entry at teardown, which needs `&mut self`
            let payload = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), payload_size) };
            (payload, CleanupEntry::with_owned(ptr, layout))
        } else {
            let payload = self.alloc(payload_size, true)?;
            let raw = NonNull::new(payload.as_mut_ptr())
                .filter(|_| !payload.is_empty())
                .map(|ptr| (ptr, payload.len()));
            (payload, CleanupEntry::new(raw))
        };

        let mut state = self.state.borrow_mut();
        let id = CleanupId(state.cleanups.len());
        state.cleanups.push(entry);
        drop(state);

        trace!(parent: &self.span, id = id.0, payload = payload_size, "add cleanup");
        Ok(CleanupHandle {
            arena: self,
            id,
            payload,
        })
    }

    /// Install the handler of a registered cleanup entry
    ///
    /// Returns false if `id` does not belong to this arena.
    pub fn set_cleanup_handler<F>(&self, id: CleanupId, handler: F) -> bool
    where
        F: FnOnce(&mut [u8]) + 'static,
    {
        match self.state.borrow_mut().cleanups.get_mut(id.0) {
            Some(entry) => {
                entry.set_handler(Box::new(handler));
                true
            }
            None => false,
        }
    }

    /// Free large objects and rewind every block, keeping the blocks
    ///
    /// Registered cleanups stay registered and are not run.
    pub fn reset(&mut self) {
        let Self {
            state,
            allocator,
            span,
            ..
        } = self;
        let state = state.get_mut();

        let mut freed = 0usize;
        for (ptr, layout) in state.large.drain() {
            // SAFETY: `&mut self` means no slice into the allocation survives
            unsafe { allocator.deallocate(ptr, layout) };
            freed += 1;
        }
        for block in &mut state.blocks {
            block.reset();
        }
        state.current = 0;

        debug!(
            parent: &*span,
            blocks = state.blocks.len(),
            large_freed = freed,
            "Arena reset"
        );
    }

    /// Run cleanups (newest first) and release everything
    pub fn destroy(self) {
        debug!(parent: &self.span, "Arena destroy requested");
        drop(self);
    }

    /// Check every block's header stamp
    pub fn verify(&self) -> MemResult<()> {
        for block in &self.state.borrow().blocks {
            block.verify()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> ArenaStats {
        let state = self.state.borrow();
        ArenaStats {
            block_size: self.block_size,
            block_count: state.blocks.len(),
            current_block: state.current,
            small_threshold: self.small_threshold,
            bytes_used: state.blocks.iter().map(MemoryBlock::used).sum(),
            bytes_reserved: state.blocks.iter().map(MemoryBlock::size).sum(),
            large_records: state.large.len(),
            large_live: state.large.live(),
            large_bytes: state.large.live_bytes(),
            cleanup_count: state.cleanups.len(),
        }
    }

    pub fn block_count(&self) -> usize {
        self.state.borrow().blocks.len()
    }

    /// Requests at or below this size are bump allocated
    pub fn small_threshold(&self) -> usize {
        self.small_threshold
    }

    /// Size of every block, header included
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    fn teardown(&mut self) {
        let Self {
            state,
            allocator,
            span,
            ..
        } = self;
        let state = state.get_mut();

        for block in &state.blocks {
            if let Err(violation) = block.verify() {
                error!(parent: &*span, %violation, "Arena block corrupted");
            }
        }

        let mut ran = 0usize;
        for entry in state.cleanups.drain(..).rev() {
            // SAFETY: bump payloads live in blocks freed only below, owned
            // payloads came from `allocator`, and the arena is exclusively
            // borrowed so no other slice aliases them
            if unsafe { entry.run(&*allocator) } {
                ran += 1;
            }
        }

        for (ptr, layout) in state.large.drain() {
            // SAFETY: owned by the large list, unreachable from callers now
            unsafe { allocator.deallocate(ptr, layout) };
        }
        let blocks = state.blocks.len();
        for block in state.blocks.drain(..) {
            // SAFETY: created with `allocator`; nothing references it now
            unsafe { block.release(&*allocator) };
        }

        debug!(parent: &*span, blocks = blocks, cleanups_run = ran, "Arena destroyed");
    }
}

impl<A: SystemAllocator> Drop for Arena<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<A: SystemAllocator> fmt::Debug for Arena<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena").field("stats", &self.stats()).finish()
    }
}
