//! Capacity bound and slot conservation

use std::sync::Arc;
use std::time::Duration;

use slotgate::{LimitError, Limiter};

use crate::{run_callers, TestError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_peak_concurrency_matches_capacity() {
    let limiter = Arc::new(Limiter::new(10).unwrap());

    let (results, in_flight) =
        run_callers(limiter.clone(), 25, Duration::from_millis(25), Ok).await;

    assert_eq!(results.len(), 25);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(in_flight.peak(), 10);
    assert_eq!(in_flight.current(), 0);
    assert_eq!(limiter.available(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bound_holds_for_various_capacities() {
    for capacity in [1, 2, 3, 7] {
        let limiter = Arc::new(Limiter::new(capacity).unwrap());

        let (results, in_flight) = run_callers(
            limiter.clone(),
            capacity * 3 + 1,
            Duration::from_millis(5),
            Ok,
        )
        .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(
            in_flight.peak() <= capacity,
            "peak {} exceeded capacity {}",
            in_flight.peak(),
            capacity
        );
        assert_eq!(limiter.available(), capacity);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slots_conserved_with_mixed_outcomes() {
    let limiter = Arc::new(Limiter::new(4).unwrap());

    let (results, _) = run_callers(limiter.clone(), 30, Duration::from_millis(2), |i| {
        if i % 3 == 0 {
            Err(TestError::Task(format!("caller {i} failed")))
        } else {
            Ok(i)
        }
    })
    .await;

    let failures = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(failures, 10);
    assert_eq!(limiter.available(), 4);
    assert_eq!(limiter.in_flight(), 0);
    assert_eq!(limiter.stats().admitted, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slots_conserved_when_tasks_panic() {
    let limiter = Arc::new(Limiter::new(2).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let cancel = tokio_util::sync::CancellationToken::new();
                limiter
                    .run(&cancel, || async move {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        if i % 2 == 0 {
                            panic!("caller {i} panicked");
                        }
                        Ok::<_, TestError>(i)
                    })
                    .await
            })
        })
        .collect();

    let joined = futures::future::join_all(handles).await;
    assert_eq!(joined.iter().filter(|j| j.is_err()).count(), 3);
    assert_eq!(limiter.available(), 2);
}

#[test]
fn test_construction_validation() {
    assert_eq!(Limiter::new(0).unwrap_err(), LimitError::InvalidCapacity);
    assert_eq!(Limiter::new(1).unwrap().capacity(), 1);
}

#[tokio::test]
async fn test_capacity_one_processes_calls_one_at_a_time() {
    let limiter = Arc::new(Limiter::new(1).unwrap());

    let (results, in_flight) =
        run_callers(limiter.clone(), 2, Duration::from_millis(10), Ok).await;

    assert_eq!(results, vec![Ok(0), Ok(1)]);
    assert_eq!(in_flight.peak(), 1);
}
