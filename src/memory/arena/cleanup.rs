/*!
 * Cleanup Entries
 * Deferred finalizers run when an arena is destroyed
 */

use super::Arena;
use crate::memory::traits::SystemAllocator;
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

/// Finalizer invoked with the entry's payload at arena destruction
pub type CleanupFn = Box<dyn FnOnce(&mut [u8])>;

/// Identifies a registered cleanup entry within its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(pub(super) usize);

pub(super) struct CleanupEntry {
    /// Payload region; `None` when no payload was requested
    payload: Option<(NonNull<u8>, usize)>,
    /// Set when the payload was too large for a block and the entry owns it
    owned: Option<Layout>,
    handler: Option<CleanupFn>,
}

impl CleanupEntry {
    /// Entry whose payload (if any) lives in the arena's bump space
    pub fn new(payload: Option<(NonNull<u8>, usize)>) -> Self {
        Self {
            payload,
            owned: None,
            handler: None,
        }
    }

    /// Entry owning a separate allocation of `layout` for its payload
    ///
    /// The allocation is never entered in the large-object list, so reset and
    /// `free_large` cannot release it ahead of the handler.
    pub fn with_owned(ptr: NonNull<u8>, layout: Layout) -> Self {
        Self {
            payload: Some((ptr, layout.size())),
            owned: Some(layout),
            handler: None,
        }
    }

    pub fn set_handler(&mut self, handler: CleanupFn) {
        self.handler = Some(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn owns_payload(&self) -> bool {
        self.owned.is_some()
    }

    /// Run the handler, if any, then free an owned payload
    ///
    /// Returns whether a handler ran.
    ///
    /// # Safety
    ///
    /// The payload region must still be allocated and nothing else may
    /// reference it for the duration of the call. An owned payload must have
    /// been allocated by `allocator`.
    pub unsafe fn run<A: SystemAllocator>(self, allocator: &A) -> bool {
        let ran = match (self.handler, self.payload) {
            (Some(handler), Some((ptr, len))) => {
                handler(std::slice::from_raw_parts_mut(ptr.as_ptr(), len));
                true
            }
            (Some(handler), None) => {
                handler(&mut []);
                true
            }
            (None, _) => false,
        };
        if let (Some(layout), Some((ptr, _))) = (self.owned, self.payload) {
            allocator.deallocate(ptr, layout);
        }
        ran
    }
}

impl fmt::Debug for CleanupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupEntry")
            .field("payload_len", &self.payload.map_or(0, |(_, len)| len))
            .field("owned", &self.owns_payload())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Handle returned by [`Arena::add_cleanup`]
///
/// Gives access to the payload reserved for the entry and lets the caller
/// install the handler. Dropping the handle leaves the entry registered; its
/// handler can still be set later through [`Arena::set_cleanup_handler`].
pub struct CleanupHandle<'a, A: SystemAllocator> {
    pub(super) arena: &'a Arena<A>,
    pub(super) id: CleanupId,
    pub(super) payload: &'a mut [u8],
}

impl<'a, A: SystemAllocator> CleanupHandle<'a, A> {
    pub fn id(&self) -> CleanupId {
        self.id
    }

    /// Payload bytes handed to the handler at destruction
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut *self.payload
    }

    /// Install (or replace) the handler
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnOnce(&mut [u8]) + 'static,
    {
        self.arena.set_cleanup_handler(self.id, handler);
    }
}

impl<A: SystemAllocator> fmt::Debug for CleanupHandle<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
