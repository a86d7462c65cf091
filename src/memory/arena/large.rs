/*!
 * Large-Object Records
 * Tracking for allocations too big for bump allocation
 */

use crate::core::errors::{MemError, MemResult};
use crate::core::limits::LARGE_REUSE_SCAN;
use std::alloc::Layout;
use std::ptr::NonNull;

/// One tracked allocation; `None` marks a slot free for reuse
#[derive(Debug, Default)]
pub(super) struct LargeRecord {
    alloc: Option<(NonNull<u8>, Layout)>,
}

/// Records in list order: the last element is the head
#[derive(Debug, Default)]
pub(super) struct LargeList {
    records: Vec<LargeRecord>,
}

impl LargeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `ptr`; returns true if a freed slot near the head was reused
    ///
    /// Fails only if the record list itself cannot grow.
    pub fn insert(&mut self, ptr: NonNull<u8>, layout: Layout) -> MemResult<bool> {
        if let Some(slot) = self
            .records
            .iter_mut()
            .rev()
            .take(LARGE_REUSE_SCAN)
            .find(|record| record.alloc.is_none())
        {
            slot.alloc = Some((ptr, layout));
            return Ok(true);
        }

        self.records
            .try_reserve(1)
            .map_err(|_| MemError::OutOfMemory {
                requested: std::mem::size_of::<LargeRecord>(),
            })?;
        self.records.push(LargeRecord {
            alloc: Some((ptr, layout)),
        });
        Ok(false)
    }

    /// Stop tracking the allocation starting at `ptr`, handing it back
    pub fn remove(&mut self, ptr: *const u8) -> Option<(NonNull<u8>, Layout)> {
        self.records
            .iter_mut()
            .rev()
            .find(|record| matches!(record.alloc, Some((p, _)) if p.as_ptr() as *const u8 == ptr))
            .and_then(|record| record.alloc.take())
    }

    /// Empty the list, yielding every live allocation
    pub fn drain(&mut self) -> impl Iterator<Item = (NonNull<u8>, Layout)> + '_ {
        self.records.drain(..).filter_map(|record| record.alloc)
    }

    /// Records in the list, free slots included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records currently holding an allocation
    pub fn live(&self) -> usize {
        self.records.iter().filter(|r| r.alloc.is_some()).count()
    }

    pub fn live_bytes(&self) -> usize {
        self.records
            .iter()
            .filter_map(|r| r.alloc.map(|(_, layout)| layout.size()))
            .sum()
    }
}
