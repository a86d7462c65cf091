/*!
 * Chunk Pool Tests
 * Recycling, counters and teardown, observed through a counting allocator
 */

use netmem::{
    ChunkChain, ChunkPool, ChunkPoolConfig, InvariantViolation, MemError, SharedChunkPool,
    TrackingAllocator,
};
use pretty_assertions::assert_eq;
use std::thread;
use tracing::Span;

fn tracked(chunk_size: usize, tracker: &TrackingAllocator) -> ChunkPool<TrackingAllocator> {
    ChunkPool::with_config(
        ChunkPoolConfig::with_chunk_size(chunk_size),
        tracker.clone(),
        Span::none(),
    )
    .unwrap()
}

#[test]
fn test_release_then_acquire_reuses_memory() {
    let tracker = TrackingAllocator::new();
    let mut pool = tracked(2048, &tracker);

    let chunk = pool.acquire().unwrap();
    let address = chunk.as_ptr();
    assert_eq!(tracker.allocations(), 1);

    pool.release(chunk).unwrap();
    let again = pool.acquire().unwrap();

    assert_eq!(again.as_ptr(), address);
    assert_eq!(tracker.allocations(), 1);
    pool.release(again).unwrap();
}

#[test]
fn test_steady_state_needs_no_allocations() {
    let tracker = TrackingAllocator::new();
    let mut pool = tracked(1024, &tracker);

    for _ in 0..100 {
        let mut chain = ChunkChain::new();
        for _ in 0..3 {
            let mut chunk = pool.acquire().unwrap();
            chunk.rewind();
            chunk.append(b"payload").unwrap();
            chain.push_back(chunk);
        }
        assert_eq!(chain.total_len(), 21);
        chain.release_all(&mut pool).unwrap();
    }

    let stats = pool.stats();
    assert_eq!(tracker.allocations(), 3);
    assert_eq!(stats.allocated, 3);
    assert_eq!(stats.recycled, 297);
    assert_eq!(stats.released, 300);
    assert_eq!(stats.free_chunks, 3);
}

#[test]
fn test_corrupted_free_chunk_fails_acquire() {
    let tracker = TrackingAllocator::new();
    let mut pool = tracked(512, &tracker);

    let mut chunk = pool.acquire().unwrap();
    let capacity = chunk.capacity();
    let trailer = unsafe { chunk.as_mut_ptr().add(capacity) };
    pool.release(chunk).unwrap();

    // Scribble over the canary while the chunk sits in the free list
    unsafe { trailer.write_bytes(0, 4) };

    let err = pool.acquire().unwrap_err();
    assert!(matches!(
        err,
        MemError::Invariant(InvariantViolation::CanaryMismatch { .. })
    ));
    assert_eq!(pool.free_count(), 0);
    assert_eq!(tracker.live_bytes(), 0);

    // The pool keeps working with fresh chunks
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_release_all_reports_first_error() {
    let mut pool = ChunkPool::new(512).unwrap();
    let mut other = ChunkPool::new(1024).unwrap();

    let mut chain = ChunkChain::new();
    chain.push_back(pool.acquire().unwrap());
    chain.push_back(other.acquire().unwrap());
    chain.push_back(pool.acquire().unwrap());

    let err = chain.release_all(&mut pool).unwrap_err();
    assert_eq!(
        err,
        MemError::Invariant(InvariantViolation::ChunkSizeMismatch {
            expected: 512,
            actual: 1024
        })
    );
    assert!(chain.is_empty());
    assert_eq!(pool.free_count(), 2);
}

#[test]
fn test_deinit_returns_all_memory() {
    let tracker = TrackingAllocator::new();
    let mut pool = tracked(4096, &tracker);

    let chunks: Vec<_> = (0..8).map(|_| pool.acquire().unwrap()).collect();
    for chunk in chunks {
        pool.release(chunk).unwrap();
    }
    assert_eq!(tracker.live_bytes(), 8 * 4096);

    pool.deinit();

    let stats = tracker.stats();
    assert_eq!(stats.live_bytes, 0);
    assert_eq!(stats.deallocations, 8);
}

#[test]
fn test_chunk_outlives_pool() {
    let tracker = TrackingAllocator::new();
    let mut pool = tracked(512, &tracker);
    let mut chunk = pool.acquire().unwrap();
    pool.deinit();

    chunk.append(b"still mine").unwrap();
    assert_eq!(chunk.as_slice(), b"still mine");
    drop(chunk);
    assert_eq!(tracker.live_bytes(), 0);
}

#[test]
fn test_shared_pool_across_threads() {
    let tracker = TrackingAllocator::new();
    let pool = SharedChunkPool::from_pool(tracked(1024, &tracker));

    let workers: Vec<_> = (0..4u8)
        .map(|id| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut chain = ChunkChain::new();
                for _ in 0..25 {
                    let mut chunk = pool.acquire().unwrap();
                    chunk.rewind();
                    chunk.append(&[id; 32]).unwrap();
                    chain.push_back(chunk);
                }
                assert!(chain.copy_to_vec().iter().all(|&b| b == id));
                pool.release_all(&mut chain).unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.released, 100);
    assert_eq!(stats.free_chunks, stats.allocated);
    assert_eq!(tracker.allocations(), stats.allocated);
}
