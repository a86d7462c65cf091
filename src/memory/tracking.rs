/*!
 * Allocation Tracking
 * Counting allocator wrapper with an optional byte budget
 */

use super::allocator::Heap;
use super::traits::SystemAllocator;
use crate::core::errors::{MemError, MemResult};
use serde::{Deserialize, Serialize};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

const NO_LIMIT: usize = usize::MAX;

#[derive(Debug)]
struct TrackingState {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    failures: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    limit: AtomicUsize,
}

/// Snapshot of a [`TrackingAllocator`]'s counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub allocations: usize,
    pub deallocations: usize,
    pub failures: usize,
    pub live_bytes: usize,
    pub peak_bytes: usize,
}

impl AllocatorStats {
    /// Regions handed out and not yet returned
    pub fn live_allocations(&self) -> usize {
        self.allocations.saturating_sub(self.deallocations)
    }
}

/// Wraps another allocator, counting every call and enforcing a byte budget
///
/// Clones share the same counters, so one tracker can be handed to an arena
/// and a chunk pool (and every chunk they create) while the caller keeps a
/// copy to read the totals. A request that would push live bytes past the
/// budget fails with `OutOfMemory` without reaching the inner allocator.
#[derive(Debug, Clone)]
pub struct TrackingAllocator<A: SystemAllocator = Heap> {
    inner: A,
    state: Arc<TrackingState>,
}

impl TrackingAllocator<Heap> {
    pub fn new() -> Self {
        Self::wrap(Heap)
    }

    /// Tracker that refuses to hold more than `limit` live bytes
    pub fn with_limit(limit: usize) -> Self {
        let tracker = Self::new();
        tracker.set_limit(Some(limit));
        tracker
    }
}

impl Default for TrackingAllocator<Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SystemAllocator> TrackingAllocator<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            state: Arc::new(TrackingState {
                allocations: AtomicUsize::new(0),
                deallocations: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                live_bytes: AtomicUsize::new(0),
                peak_bytes: AtomicUsize::new(0),
                limit: AtomicUsize::new(NO_LIMIT),
            }),
        }
    }

    /// Change the live-byte budget; `None` removes it
    pub fn set_limit(&self, limit: Option<usize>) {
        self.state
            .limit
            .store(limit.unwrap_or(NO_LIMIT), Ordering::Relaxed);
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            allocations: self.state.allocations.load(Ordering::Relaxed),
            deallocations: self.state.deallocations.load(Ordering::Relaxed),
            failures: self.state.failures.load(Ordering::Relaxed),
            live_bytes: self.state.live_bytes.load(Ordering::Relaxed),
            peak_bytes: self.state.peak_bytes.load(Ordering::Relaxed),
        }
    }

    /// Number of successful allocations so far
    pub fn allocations(&self) -> usize {
        self.state.allocations.load(Ordering::Relaxed)
    }

    pub fn live_bytes(&self) -> usize {
        self.state.live_bytes.load(Ordering::Relaxed)
    }

    fn fail(&self, requested: usize) -> MemError {
        self.state.failures.fetch_add(1, Ordering::Relaxed);
        MemError::OutOfMemory { requested }
    }
}

impl<A: SystemAllocator> SystemAllocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> MemResult<NonNull<u8>> {
        let size = layout.size();
        let limit = self.state.limit.load(Ordering::Relaxed);
        let live = self.state.live_bytes.load(Ordering::Relaxed);

        if live.saturating_add(size) > limit {
            warn!(
                requested = size,
                live_bytes = live,
                limit = limit,
                "Allocation refused: budget exhausted"
            );
            return Err(self.fail(size));
        }

        let ptr = self.inner.allocate(layout).map_err(|_| self.fail(size))?;

        self.state.allocations.fetch_add(1, Ordering::Relaxed);
        let live = self.state.live_bytes.fetch_add(size, Ordering::Relaxed) + size;
        self.state.peak_bytes.fetch_max(live, Ordering::Relaxed);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout);
        self.state.deallocations.fetch_add(1, Ordering::Relaxed);
        self.state
            .live_bytes
            .fetch_sub(layout.size(), Ordering::Relaxed);
    }
}
