//! Concurrent access tests for the service pool.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use md2pdf::factory::mock::{MOCK_PDF, MockRendererFactory};
use md2pdf::prelude::*;
use tokio::task::JoinSet;

fn pool(size: usize, factory: &MockRendererFactory) -> Arc<ServicePool> {
    Arc::new(
        ServicePool::builder()
            .size(size)
            .factory(Box::new(factory.clone()))
            .build()
            .unwrap(),
    )
}

/// Verifies a size-1 pool blocks the second caller until release and then
/// hands over the same service instance.
#[test]
fn test_size_one_blocks_and_reuses() {
    let factory = MockRendererFactory::new();
    let pool = pool(1, &factory);

    let first = pool.acquire().unwrap();
    let first_id = first.id();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || {
            let handle = pool.acquire().unwrap();
            tx.send(handle.id()).unwrap();
        })
    };

    assert!(
        matches!(rx.recv_timeout(Duration::from_millis(200)), Err(mpsc::RecvTimeoutError::Timeout)),
        "Second acquire must block while the only service is out"
    );

    pool.release(first);
    let second_id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    waiter.join().unwrap();

    assert_eq!(second_id, first_id, "Same service instance is handed over");
    assert_eq!(factory.counters().created(), 1);
}

/// Verifies many concurrent conversions never exceed the pool size.
#[tokio::test]
async fn test_concurrent_conversions_bounded_by_pool() {
    let factory = MockRendererFactory::new().with_delay(Duration::from_millis(20));
    let pool = pool(2, &factory);

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let pool = Arc::clone(&pool);
        tasks.spawn_blocking(move || {
            let mut service = pool.acquire()?;
            let input = ConversionInput::new(format!("# Doc {i}\n\nBody"));
            service.convert(&ConversionContext::new(), &input)
        });
    }

    while let Some(result) = tasks.join_next().await {
        let pdf = result.expect("task should not panic").expect("conversion should succeed");
        assert_eq!(pdf, MOCK_PDF);
    }

    let counters = factory.counters();
    assert_eq!(counters.renders(), 8);
    assert!(counters.created() <= 2);
    assert!(counters.max_in_flight() <= 2);

    pool.close().unwrap();
    assert_eq!(counters.closed(), counters.created());
}

/// Verifies concurrent stats reads while services churn.
#[tokio::test]
async fn test_concurrent_stats_access() {
    let pool = pool(3, &MockRendererFactory::new());

    let mut tasks = JoinSet::new();
    for _ in 0..6 {
        let pool = Arc::clone(&pool);
        tasks.spawn_blocking(move || {
            for _ in 0..50 {
                let handle = pool.acquire().unwrap();
                let stats = pool.stats();
                assert!(stats.available <= stats.size);
                drop(handle);
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        assert!(result.is_ok(), "Task should complete without panic");
    }
    assert_eq!(pool.stats().available, 3);
}

/// Verifies cancelling one conversion leaves the pooled service usable.
#[test]
fn test_cancel_does_not_poison_service() {
    let factory = MockRendererFactory::new();
    let pool = pool(1, &factory);

    let cancelled = ConversionContext::new();
    cancelled.cancel();
    {
        let mut service = pool.acquire().unwrap();
        let err = service
            .convert(&cancelled, &ConversionInput::new("# A"))
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    let mut service = pool.acquire().unwrap();
    let pdf = service
        .convert(&ConversionContext::new(), &ConversionInput::new("# B"))
        .unwrap();
    assert_eq!(pdf, MOCK_PDF);
    assert_eq!(factory.counters().closed(), 0);
}
