//! Integration tests for the inference worker pool.
//!
//! These tests verify the complete pool workflow including:
//! - Task submission and result pairing under load
//! - Fixed concurrency (tasks beyond the worker count queue up)
//! - Busy tracking across a batch
//! - Shutdown draining in-flight work without deadlock

use std::sync::Arc;
use std::time::{Duration, Instant};
use trocr::admission::ResourceManager;
use trocr::engine::{Engine, EngineHandles, MockEngine, PixelBuffer};
use trocr::pool::{SubmitError, WorkerPool};

// =============================================================================
// Test Helpers
// =============================================================================

/// Builds a pool over a mock engine with freshly initialized pipelines.
fn build_pool(
    engine: Arc<MockEngine>,
    workers: usize,
    queue_capacity: usize,
) -> (Arc<WorkerPool>, Arc<ResourceManager>) {
    let detection = engine
        .init_pipeline(0, trocr::engine::Pipeline::Detection, "det.bin".as_ref())
        .unwrap();
    let recognition = engine
        .init_pipeline(0, trocr::engine::Pipeline::Recognition, "rec.bin".as_ref())
        .unwrap();
    let manager = Arc::new(ResourceManager::new(EngineHandles {
        detection,
        recognition,
    }));
    let pool = Arc::new(WorkerPool::new(
        workers,
        queue_capacity,
        engine,
        Arc::clone(&manager),
    ));
    (pool, manager)
}

/// A buffer whose mock echo text is `text`.
fn text_buffer(text: &str) -> PixelBuffer {
    let data = text.as_bytes().to_vec();
    let width = data.len() as u32;
    PixelBuffer::grayscale(data, 1, width)
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn test_five_tasks_on_two_workers_run_in_three_batches() {
    let delay = Duration::from_millis(100);
    let engine = Arc::new(MockEngine::new().with_infer_delay(delay));
    let (pool, _manager) = build_pool(engine, 2, 16);

    let start = Instant::now();
    let pending: Vec<_> = (0..5)
        .map(|i| pool.enqueue(text_buffer(&format!("job-{}", i))).unwrap())
        .collect();

    for p in pending {
        let regions = p.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(regions.len(), 1);
    }
    let elapsed = start.elapsed();

    // ceil(5 / 2) = 3 sequential batches of the inference delay.
    assert!(
        elapsed >= delay * 3,
        "5 tasks on 2 workers finished in {:?}, faster than 3 batches",
        elapsed
    );
    assert!(
        elapsed < delay * 3 + Duration::from_millis(500),
        "5 tasks on 2 workers took {:?}, far more than 3 batches",
        elapsed
    );
    assert_eq!(pool.peak_busy(), 2);
}

#[tokio::test]
async fn test_hundred_tasks_pair_each_result_with_its_submission() {
    let engine = Arc::new(MockEngine::new());
    let (pool, _manager) = build_pool(engine, 5, 128);

    let pending: Vec<_> = (0..100)
        .map(|i| {
            let text = format!("sample-{:03}", i);
            (text.clone(), pool.enqueue(text_buffer(&text)).unwrap())
        })
        .collect();

    for (expected, p) in pending {
        let regions = p.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, expected);
    }
    assert!(!pool.busy());
}

#[tokio::test]
async fn test_queue_full_rejects_with_capacity() {
    let delay = Duration::from_millis(200);
    let engine = Arc::new(MockEngine::new().with_infer_delay(delay));
    let (pool, _manager) = build_pool(engine, 1, 1);

    // One task per worker plus one queued slot; keep submitting until the
    // queue refuses.
    let mut accepted = Vec::new();
    let mut rejected = None;
    for i in 0..8 {
        match pool.enqueue(text_buffer(&format!("t{}", i))) {
            Ok(p) => accepted.push(p),
            Err(e) => {
                rejected = Some(e);
                break;
            }
        }
    }

    match rejected {
        Some(SubmitError::QueueFull { capacity }) => assert_eq!(capacity, 1),
        other => panic!("expected QueueFull, got {:?}", other),
    }

    for p in accepted {
        p.wait(Duration::from_secs(5)).await.unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_and_rejects_new_work() {
    let delay = Duration::from_millis(100);
    let engine = Arc::new(MockEngine::new().with_infer_delay(delay));
    let (pool, _manager) = build_pool(engine, 2, 16);

    let pending: Vec<_> = (0..4)
        .map(|i| pool.enqueue(text_buffer(&format!("drain-{}", i))).unwrap())
        .collect();

    let shutdown_pool = Arc::clone(&pool);
    let shutdown = tokio::task::spawn_blocking(move || shutdown_pool.shutdown());

    // Everything accepted before shutdown resolves, successfully or as
    // unavailable, but never hangs.
    for p in pending {
        let _ = p.wait(Duration::from_secs(5)).await;
    }
    shutdown.await.unwrap();

    assert!(matches!(
        pool.enqueue(text_buffer("late")),
        Err(SubmitError::ShutDown)
    ));
}

#[tokio::test]
async fn test_busy_clears_after_batch_completes() {
    let engine = Arc::new(MockEngine::new().with_infer_delay(Duration::from_millis(50)));
    let (pool, _manager) = build_pool(engine, 3, 16);

    let pending: Vec<_> = (0..3)
        .map(|i| pool.enqueue(text_buffer(&format!("b{}", i))).unwrap())
        .collect();
    for p in pending {
        p.wait(Duration::from_secs(5)).await.unwrap();
    }

    // Busy slots release before results resolve, so the pool reads idle
    // as soon as the last wait returns.
    assert!(!pool.busy());
    assert_eq!(pool.busy_count(), 0);
    pool.wait_idle().await;
}
