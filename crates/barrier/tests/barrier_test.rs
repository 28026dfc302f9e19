//! Integration tests for the quiescence barrier

use futures::FutureExt;
use quiesce_barrier::{BarrierError, ContextId, QuiescenceBarrier, ResourceName};
use quiesce_common::BarrierConfig;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_matched_opens_and_closes_end_empty() {
    let barrier = QuiescenceBarrier::new();
    let contexts = ["A", "B", "C"];
    let names = ["db1", "db2", "db3", "db4"];

    for context in contexts {
        for name in names {
            barrier.notify_opened(context, name).unwrap();
        }
    }
    assert_eq!(barrier.open_count(), 12);
    assert_eq!(barrier.context_count(), 3);

    // Close in a different order than opened
    for name in names.iter().rev() {
        for context in contexts.iter().rev() {
            assert!(!barrier.is_empty());
            barrier.notify_closed(*context, *name).unwrap();
        }
    }

    assert!(barrier.is_empty());
    assert_eq!(barrier.context_count(), 0);
}

#[test]
fn test_duplicate_open_is_rejected() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("c", "r").unwrap();

    let err = barrier.notify_opened("c", "r").unwrap_err();
    assert_eq!(
        err,
        BarrierError::DuplicateResource {
            context_id: ContextId::from("c"),
            resource_name: ResourceName::from("r"),
        }
    );
    assert!(barrier.is_open("c", "r"));
    assert_eq!(barrier.open_count(), 1);

    // Still usable afterwards
    barrier.notify_closed("c", "r").unwrap();
    assert!(barrier.is_empty());
}

#[test]
fn test_close_without_open_is_rejected() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("c", "other").unwrap();

    let err = barrier.notify_closed("c", "r").unwrap_err();
    assert!(matches!(err, BarrierError::UnknownResource { .. }));
    assert!(err.is_misuse());
    assert_eq!(barrier.open_count(), 1);
    assert!(barrier.is_open("c", "other"));
}

#[test]
fn test_modify_requires_open_resource() {
    let barrier = QuiescenceBarrier::new();
    assert!(matches!(
        barrier.notify_modified("c", "r"),
        Err(BarrierError::UnknownResource { .. })
    ));

    barrier.notify_opened("c", "r").unwrap();
    barrier.notify_modified("c", "r").unwrap();
    assert!(barrier.snapshot()[0].last_modified.is_some());
    assert_eq!(barrier.open_count(), 1);
}

#[test]
fn test_is_empty_is_stable_without_mutation() {
    let barrier = QuiescenceBarrier::new();
    for _ in 0..5 {
        assert!(barrier.is_empty());
    }
    barrier.notify_opened("c", "r").unwrap();
    for _ in 0..5 {
        assert!(!barrier.is_empty());
    }
}

#[tokio::test]
async fn test_wait_on_empty_registry_returns_immediately() {
    let barrier = QuiescenceBarrier::new();

    assert_eq!(barrier.wait_until_quiescent().now_or_never(), Some(Ok(())));
    assert!(!barrier.is_waiting());
    assert_eq!(barrier.wait_until_quiescent_blocking(), Ok(()));
}

#[test]
fn test_wait_releases_only_on_last_close() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();
    barrier.notify_opened("A", "db2").unwrap();

    let mut wait = Box::pin(barrier.wait_until_quiescent());
    assert!(wait.as_mut().now_or_never().is_none());
    assert!(barrier.is_waiting());

    barrier.notify_closed("A", "db1").unwrap();
    assert!(wait.as_mut().now_or_never().is_none());
    assert!(barrier.is_waiting());

    barrier.notify_closed("A", "db2").unwrap();
    assert!(!barrier.is_waiting());
    assert_eq!(wait.as_mut().now_or_never(), Some(Ok(())));
    assert!(barrier.is_empty());
}

#[test]
fn test_notifications_flow_while_waiting() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();

    let mut wait = Box::pin(barrier.wait_until_quiescent());
    assert!(wait.as_mut().now_or_never().is_none());

    // A late open keeps the barrier shut past the first handle's close
    barrier.notify_opened("B", "db1").unwrap();
    barrier.notify_closed("A", "db1").unwrap();
    assert!(wait.as_mut().now_or_never().is_none());

    barrier.notify_closed("B", "db1").unwrap();
    assert_eq!(wait.as_mut().now_or_never(), Some(Ok(())));
}

#[test]
fn test_second_wait_is_rejected_while_first_is_active() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();

    let mut first = Box::pin(barrier.wait_until_quiescent());
    assert!(first.as_mut().now_or_never().is_none());

    assert_eq!(
        barrier.wait_until_quiescent().now_or_never(),
        Some(Err(BarrierError::WaitAlreadyActive))
    );
    assert_eq!(
        barrier.wait_until_quiescent_blocking(),
        Err(BarrierError::WaitAlreadyActive)
    );

    // The first wait is unaffected
    barrier.notify_closed("A", "db1").unwrap();
    assert_eq!(first.as_mut().now_or_never(), Some(Ok(())));
}

#[test]
fn test_dropped_wait_is_withdrawn() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();

    {
        let mut wait = Box::pin(barrier.wait_until_quiescent());
        assert!(wait.as_mut().now_or_never().is_none());
        assert!(barrier.is_waiting());
    }
    assert!(!barrier.is_waiting());

    let mut again = Box::pin(barrier.wait_until_quiescent());
    assert!(again.as_mut().now_or_never().is_none());
    barrier.notify_closed("A", "db1").unwrap();
    assert_eq!(again.as_mut().now_or_never(), Some(Ok(())));
}

#[tokio::test]
async fn test_wait_timeout_withdraws_wait() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();
    barrier.notify_opened("A", "db2").unwrap();

    let result = barrier
        .wait_until_quiescent_timeout(Duration::from_millis(20))
        .await;
    assert_eq!(result, Err(BarrierError::Timeout { open: 2 }));
    assert!(result.unwrap_err().is_retryable());
    assert!(!barrier.is_waiting());

    // A fresh wait is accepted after the timeout
    barrier.notify_closed("A", "db1").unwrap();
    barrier.notify_closed("A", "db2").unwrap();
    assert_eq!(
        barrier
            .wait_until_quiescent_timeout(Duration::from_millis(20))
            .await,
        Ok(())
    );
}

#[tokio::test]
async fn test_configured_timeout_applies_to_untimed_wait() {
    let config = BarrierConfig {
        wait_timeout_ms: Some(10),
        ..Default::default()
    };
    let barrier = QuiescenceBarrier::from_config(&config);
    assert_eq!(barrier.wait_timeout(), Some(Duration::from_millis(10)));

    barrier.notify_opened("A", "db1").unwrap();
    assert_eq!(
        barrier.wait_until_quiescent().await,
        Err(BarrierError::Timeout { open: 1 })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wait_and_close_release_exactly_once() {
    for _ in 0..200 {
        let barrier = Arc::new(QuiescenceBarrier::new());
        barrier.notify_opened("B", "db1").unwrap();

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait_until_quiescent().await })
        };
        let closer = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.notify_closed("B", "db1"))
        };

        closer.join().unwrap().unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert!(barrier.is_empty());
        assert!(!barrier.is_waiting());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_closers_one_release() {
    let barrier = Arc::new(QuiescenceBarrier::new());
    for i in 0..32 {
        barrier.notify_opened(format!("ctx-{}", i % 4), format!("db{}", i)).unwrap();
    }

    let waiter = {
        let barrier = barrier.clone();
        tokio::spawn(async move { barrier.wait_until_quiescent().await })
    };

    let closers: Vec<_> = (0..32)
        .map(|i| {
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.notify_closed(format!("ctx-{}", i % 4), format!("db{}", i))
            })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap().unwrap();
    }

    assert_eq!(waiter.await.unwrap(), Ok(()));
    assert!(barrier.is_empty());
}

#[test]
fn test_blocking_wait_released_by_other_thread() {
    let barrier = Arc::new(QuiescenceBarrier::new());
    barrier.notify_opened("A", "db1").unwrap();
    barrier.notify_opened("A", "db2").unwrap();

    let waiter = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait_until_quiescent_blocking())
    };

    while !barrier.is_waiting() {
        thread::yield_now();
    }
    barrier.notify_closed("A", "db1").unwrap();
    assert!(barrier.is_waiting());
    barrier.notify_closed("A", "db2").unwrap();

    assert_eq!(waiter.join().unwrap(), Ok(()));
    assert!(!barrier.is_waiting());
}

#[test]
fn test_blocking_wait_timeout() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();

    assert_eq!(
        barrier.wait_until_quiescent_blocking_timeout(Duration::from_millis(20)),
        Err(BarrierError::Timeout { open: 1 })
    );
    assert!(!barrier.is_waiting());
}

#[test]
fn test_close_context_releases_waiter() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db2").unwrap();
    barrier.notify_opened("A", "db1").unwrap();
    barrier.notify_opened("B", "db1").unwrap();

    let mut wait = Box::pin(barrier.wait_until_quiescent());
    assert!(wait.as_mut().now_or_never().is_none());

    assert_eq!(
        barrier.close_context("A"),
        vec![ResourceName::from("db1"), ResourceName::from("db2")]
    );
    assert!(!barrier.is_context_used("A"));
    assert!(wait.as_mut().now_or_never().is_none());

    assert!(barrier.close_context("missing").is_empty());
    assert_eq!(barrier.close_context("B"), vec![ResourceName::from("db1")]);
    assert_eq!(wait.as_mut().now_or_never(), Some(Ok(())));
}

#[test]
fn test_close_all_releases_waiter() {
    let barrier = QuiescenceBarrier::new();
    barrier.notify_opened("A", "db1").unwrap();
    barrier.notify_opened("B", "db1").unwrap();

    let mut wait = Box::pin(barrier.wait_until_quiescent());
    assert!(wait.as_mut().now_or_never().is_none());

    assert_eq!(barrier.close_all().len(), 2);
    assert_eq!(wait.as_mut().now_or_never(), Some(Ok(())));
    assert!(barrier.close_all().is_empty());
}
