/*!
 * Arena Tests
 * Bump allocation, growth, reset and teardown through the public API
 */

use netmem::core::limits::{ARENA_ALIGNMENT, BLOCK_HEADER_SIZE, DEFAULT_ARENA_SIZE};
use netmem::{Arena, ArenaConfig, InvariantViolation, MemError, TrackingAllocator};
use pretty_assertions::assert_eq;
use tracing::Span;

fn tracked(capacity: usize, tracker: &TrackingAllocator) -> Arena<TrackingAllocator> {
    Arena::with_config(
        ArenaConfig::with_capacity(capacity),
        tracker.clone(),
        Span::none(),
    )
    .unwrap()
}

#[test]
fn test_create_default_arena() {
    let arena = Arena::create(DEFAULT_ARENA_SIZE).unwrap();
    let stats = arena.stats();

    assert_eq!(stats.block_count, 1);
    assert_eq!(stats.current_block, 0);
    assert_eq!(stats.bytes_used, 0);
    assert_eq!(stats.small_threshold, 4095);
    assert!(arena.verify().is_ok());
}

#[test]
fn test_create_rejects_tiny_capacity() {
    assert!(matches!(Arena::create(8), Err(MemError::InvalidConfig(_))));
}

#[test]
fn test_small_threshold_follows_capacity() {
    let arena = Arena::create(1024).unwrap();
    assert_eq!(arena.small_threshold(), 1024 - BLOCK_HEADER_SIZE);
    assert_eq!(arena.block_size(), 1024);
}

#[test]
fn test_allocations_are_usable() {
    let arena = Arena::create(4096).unwrap();

    let header = arena.alloc_str("Host: example.com").unwrap();
    let id = arena.alloc_value(42u64).unwrap();
    let zeroed = arena.alloc_zeroed(64).unwrap();
    let copy = arena.alloc_copy(b"\r\n\r\n").unwrap();

    *id += 1;
    zeroed[0] = 1;
    header.make_ascii_uppercase();

    assert_eq!(&*header, "HOST: EXAMPLE.COM");
    assert_eq!(*id, 43);
    assert_eq!(zeroed.iter().map(|&b| b as usize).sum::<usize>(), 1);
    assert_eq!(copy, b"\r\n\r\n");
    let id_addr = id as *mut u64 as usize;
    assert_eq!(id_addr % std::mem::align_of::<u64>(), 0);
}

#[test]
fn test_unaligned_packs_tightly() {
    let arena = Arena::create(4096).unwrap();
    let a = arena.alloc(3, false).unwrap().as_ptr() as usize;
    let b = arena.alloc(5, false).unwrap().as_ptr() as usize;
    let c = arena.alloc(1, true).unwrap().as_ptr() as usize;

    assert_eq!(b, a + 3);
    assert_eq!(c % ARENA_ALIGNMENT, 0);
    assert!(c >= b + 5);
}

#[test]
fn test_invalid_alignment() {
    let arena = Arena::create(4096).unwrap();
    let err = arena.alloc_with_align(16, 24).unwrap_err();
    assert_eq!(
        err,
        MemError::Invariant(InvariantViolation::InvalidAlignment(24))
    );
}

#[test]
fn test_growth_adds_blocks() {
    let tracker = TrackingAllocator::new();
    let arena = tracked(1024, &tracker);
    let threshold = arena.small_threshold();

    for _ in 0..5 {
        arena.alloc(threshold, false).unwrap();
    }

    assert_eq!(arena.block_count(), 5);
    assert_eq!(tracker.allocations(), 5);
    assert_eq!(tracker.live_bytes(), 5 * 1024);
}

#[test]
fn test_out_of_memory_is_recoverable() {
    let tracker = TrackingAllocator::new();
    let arena = tracked(1024, &tracker);
    let threshold = arena.small_threshold();

    arena.alloc(threshold, false).unwrap();
    tracker.set_limit(Some(tracker.live_bytes()));

    let err = arena.alloc(16, false).unwrap_err();
    assert_eq!(err, MemError::OutOfMemory { requested: 1024 });
    assert_eq!(arena.block_count(), 1);

    tracker.set_limit(None);
    assert!(arena.alloc(16, false).is_ok());
    assert_eq!(arena.block_count(), 2);
}

#[test]
fn test_reset_keeps_blocks_and_frees_large() {
    let tracker = TrackingAllocator::new();
    let mut arena = tracked(1024, &tracker);
    let threshold = arena.small_threshold();

    arena.alloc(threshold, false).unwrap();
    arena.alloc(threshold, false).unwrap();
    arena.alloc(10_000, true).unwrap();
    assert_eq!(tracker.allocations(), 3);

    arena.reset();

    let stats = arena.stats();
    assert_eq!(stats.block_count, 2);
    assert_eq!(stats.current_block, 0);
    assert_eq!(stats.bytes_used, 0);
    assert_eq!(stats.large_live, 0);
    assert_eq!(tracker.live_bytes(), 2 * 1024);

    // Rewound blocks are reused without new system allocations
    arena.alloc(threshold, false).unwrap();
    arena.alloc(threshold, false).unwrap();
    assert_eq!(tracker.allocations(), 3);
}

#[test]
fn test_destroy_releases_everything() {
    let tracker = TrackingAllocator::new();
    let arena = tracked(2048, &tracker);

    for i in 0..200 {
        arena.alloc(64 + i % 7, i % 2 == 0).unwrap();
    }
    arena.alloc(8192, true).unwrap();
    arena.alloc(9000, false).unwrap();
    assert!(tracker.live_bytes() > 0);

    arena.destroy();

    let stats = tracker.stats();
    assert_eq!(stats.live_bytes, 0);
    assert_eq!(stats.allocations, stats.deallocations);
}

#[test]
fn test_drop_matches_destroy() {
    let tracker = TrackingAllocator::new();
    {
        let arena = tracked(4096, &tracker);
        arena.alloc(100, true).unwrap();
        arena.alloc(5000, true).unwrap();
    }
    assert_eq!(tracker.live_bytes(), 0);
}
