/*!
 * Memory Traits
 * The seam between arenas/pools and the system allocator
 */

use crate::core::errors::MemResult;
use std::alloc::Layout;
use std::ptr::NonNull;

/// Source of raw memory regions
///
/// Arenas and chunk pools never call `std::alloc` directly; every block,
/// large object and chunk goes through an implementation of this trait.
/// That keeps allocation policy (budgets, accounting, test doubles) out of
/// the core.
pub trait SystemAllocator {
    /// Allocate a region described by `layout`
    ///
    /// `layout.size()` is never zero. Failure must be reported as
    /// `MemError::OutOfMemory`, never by panicking or aborting.
    fn allocate(&self, layout: Layout) -> MemResult<NonNull<u8>>;

    /// Return a region to the allocator
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator (or a
    /// clone of it) with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

impl<T: SystemAllocator + ?Sized> SystemAllocator for &T {
    fn allocate(&self, layout: Layout) -> MemResult<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}
