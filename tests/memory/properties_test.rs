/*!
 * Arena Property Tests
 * Randomized no-overlap checks and the reset replay scenario
 */

use netmem::core::limits::{ARENA_ALIGNMENT, BLOCK_FAILURE_LIMIT};
use netmem::core::types::ranges_overlap;
use netmem::{Arena, ArenaConfig, TrackingAllocator};
use tracing::Span;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn request() -> impl Strategy<Value = (usize, bool)> {
    prop_oneof![
        8 => (1usize..256, any::<bool>()),
        2 => (256usize..2048, any::<bool>()),
        1 => (2048usize..6000, any::<bool>()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_allocations_never_overlap(
        capacity in 512usize..8192,
        requests in prop::collection::vec(request(), 1..120),
    ) {
        let arena = Arena::create(capacity).unwrap();
        let mut live: Vec<&mut [u8]> = Vec::new();

        for (i, &(size, aligned)) in requests.iter().enumerate() {
            let bytes = arena.alloc(size, aligned).unwrap();
            prop_assert_eq!(bytes.len(), size);
            if aligned {
                prop_assert_eq!(bytes.as_ptr() as usize % ARENA_ALIGNMENT, 0);
            }
            bytes.fill(i as u8);
            live.push(bytes);
        }

        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                prop_assert!(!ranges_overlap(
                    a.as_ptr() as usize,
                    a.len(),
                    b.as_ptr() as usize,
                    b.len()
                ));
            }
        }

        // Every region still holds the pattern written into it
        for (i, bytes) in live.iter().enumerate() {
            prop_assert!(bytes.iter().all(|&b| b == i as u8));
        }
        prop_assert!(arena.verify().is_ok());
    }

    // At most six blocks are ever needed, so no block absorbs enough failed
    // scans to be skipped and both passes are plain first-fit
    #[test]
    fn prop_reset_replays_identically(
        requests in prop::collection::vec((1usize..400, any::<bool>()), 1..24),
    ) {
        let mut arena = Arena::create(2048).unwrap();

        let first: Vec<usize> = requests
            .iter()
            .map(|&(size, aligned)| arena.alloc(size, aligned).unwrap().as_ptr() as usize)
            .collect();
        let blocks = arena.block_count();

        arena.reset();
        let after_one = arena.stats();
        arena.reset();
        prop_assert_eq!(arena.stats(), after_one);

        let second: Vec<usize> = requests
            .iter()
            .map(|&(size, aligned)| arena.alloc(size, aligned).unwrap().as_ptr() as usize)
            .collect();
        prop_assert_eq!(first, second);
        prop_assert_eq!(arena.block_count(), blocks);
    }
}

#[test]
fn test_reset_replay_after_blocks_skipped() {
    let tracker = TrackingAllocator::new();
    let mut arena =
        Arena::with_config(ArenaConfig::with_capacity(1024), tracker.clone(), Span::none())
            .unwrap();
    let threshold = arena.small_threshold();

    // One nearly full block, then enough full-block requests to push the
    // scan start past it, then a small request it could still hold
    let mut requests = vec![threshold - 16];
    requests.extend(std::iter::repeat(threshold).take(BLOCK_FAILURE_LIMIT as usize + 1));
    requests.push(8);

    for &size in &requests {
        arena.alloc(size, true).unwrap();
    }
    let before = arena.stats();
    assert!(before.current_block > 0);

    arena.reset();
    assert_eq!(arena.stats().current_block, 0);
    let allocations = tracker.allocations();

    let replay: Vec<usize> = requests
        .iter()
        .map(|&size| arena.alloc(size, true).unwrap().as_ptr() as usize)
        .collect();
    assert_eq!(arena.block_count(), before.block_count);
    assert_eq!(tracker.allocations(), allocations);
    assert!(arena.verify().is_ok());

    // A second replay lands on exactly the same addresses
    arena.reset();
    let again: Vec<usize> = requests
        .iter()
        .map(|&size| arena.alloc(size, true).unwrap().as_ptr() as usize)
        .collect();
    assert_eq!(replay, again);
    assert_eq!(arena.block_count(), before.block_count);
}

#[test]
fn test_page_sized_arena_scenario() {
    let mut arena = Arena::create(4096).unwrap();

    let first: Vec<usize> = (0..13)
        .map(|_| arena.alloc(300, true).unwrap().as_ptr() as usize)
        .collect();
    assert_eq!(arena.block_count(), 1);
    for pair in first.windows(2) {
        assert_eq!(pair[1] - pair[0], 304);
    }

    arena.reset();

    let second: Vec<usize> = (0..13)
        .map(|_| arena.alloc(300, true).unwrap().as_ptr() as usize)
        .collect();
    assert_eq!(arena.block_count(), 1);
    assert_eq!(first, second);
}
