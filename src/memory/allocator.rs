/*!
 * Heap Allocator
 * Default system allocator backed by the global Rust allocator
 */

use super::traits::SystemAllocator;
use crate::core::errors::{MemError, MemResult};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use tracing::{error, trace};

/// The process-wide global allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heap;

impl SystemAllocator for Heap {
    fn allocate(&self, layout: Layout) -> MemResult<NonNull<u8>> {
        debug_assert!(layout.size() != 0);

        // SAFETY: callers never request zero-sized layouts
        let ptr = unsafe { alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => {
                trace!(size = layout.size(), address = format!("{:p}", ptr), "malloc");
                Ok(ptr)
            }
            None => {
                error!(size = layout.size(), "malloc failed");
                Err(MemError::OutOfMemory {
                    requested: layout.size(),
                })
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        trace!(size = layout.size(), address = format!("{:p}", ptr), "free");
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}
