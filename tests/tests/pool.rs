use utils::*;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use traffirator::prelude::*;
use traffirator::{Phase, PoolError, SpawnOutcome};

#[tracing_test::traced_test]
#[tokio::test]
async fn finite_run_recycles_until_total() {
    let gate = Gate::new();
    let mode = RunMode::Finite(5);
    let pool = PoolController::new(gate.factory(), mode, 2, summary(mode, 2));

    let outcome = pool.start().unwrap();
    assert_eq!(outcome, SpawnOutcome { started: 2, failed: 0 });
    assert_eq!(pool.current_active_count(), 2);

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.wait_until_finished().await })
    };

    for completed in 1..=5u64 {
        assert!(!pool.is_finished());
        gate.release(1);
        eventually(|| pool.stats().completed == completed).await;

        let stats = pool.stats();
        assert_consistent(&stats);
        assert_eq!(stats.started, (completed + 2).min(5));
    }

    finished(&pool).await;
    waiter.await.unwrap();
    assert!(pool.is_finished());
    assert_eq!(pool.current_active_count(), 0);
    assert_eq!(gate.created(), 5);
    assert_eq!(pool.teardown().unwrap().completed, 5);
}

#[tracing_test::traced_test]
#[tokio::test]
async fn infinite_resize_converges_lazily() {
    let gate = Gate::new();
    let mode = RunMode::Infinite;
    let summary = summary(mode, 3);
    let pool = PoolController::new(gate.factory(), mode, 3, summary.clone());

    pool.start().unwrap();
    assert_eq!(pool.current_active_count(), 3);

    let outcome = pool.set_target_concurrency(10).unwrap();
    assert_eq!(outcome.started, 7);
    assert_eq!(pool.current_active_count(), 10);

    let outcome = pool.set_target_concurrency(1).unwrap();
    assert_eq!(outcome.attempted(), 0);
    assert_eq!(pool.current_active_count(), 10);

    gate.release(9);
    eventually(|| pool.stats().completed == 9).await;
    let stats = pool.stats();
    assert_consistent(&stats);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.started, 10);

    // Back under the target, so the next completion is replaced.
    gate.release(1);
    eventually(|| pool.stats().completed == 10).await;
    let stats = pool.stats();
    assert_eq!(stats.active, 1);
    assert_eq!(stats.started, 11);

    pool.request_stop().unwrap();
    gate.release(1);
    finished(&pool).await;

    let targets: Vec<_> = summary.changes().iter().map(|c| c.new_target).collect();
    assert_eq!(targets, [10, 1]);
}

#[tracing_test::traced_test]
#[tokio::test]
async fn stop_wins_over_later_resize() {
    let gate = Gate::new();
    let mode = RunMode::Infinite;
    let pool = PoolController::new(gate.factory(), mode, 4, summary(mode, 4));

    pool.start().unwrap();
    pool.request_stop().unwrap();

    let outcome = pool.set_target_concurrency(20).unwrap();
    assert_eq!(outcome, SpawnOutcome::default());
    assert_eq!(pool.current_active_count(), 4);

    gate.release(3);
    eventually(|| pool.stats().completed == 3).await;
    assert!(!pool.is_finished());

    gate.release(1);
    finished(&pool).await;

    let stats = pool.stats();
    assert_eq!(stats.started, 4);
    assert_eq!(stats.active, 0);
    assert_eq!(gate.created(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_racing_resize_never_spawns_after_stop() {
    for _ in 0..50 {
        let gate = Gate::new();
        let mode = RunMode::Infinite;
        let pool = PoolController::new(gate.factory(), mode, 4, summary(mode, 4));
        pool.start().unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let stopper = {
            let (pool, barrier) = (pool.clone(), barrier.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                pool.request_stop().unwrap();
            })
        };
        let resizer = {
            let (pool, barrier) = (pool.clone(), barrier.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                pool.set_target_concurrency(20).unwrap()
            })
        };
        stopper.await.unwrap();
        let outcome = resizer.await.unwrap();

        // Whichever call took the lock first decides; a stop seen first wins outright.
        let expected = if outcome.started == 0 { 4 } else { 20 };
        assert_eq!(pool.stats().started, expected);

        gate.release(20);
        finished(&pool).await;
        let stats = pool.teardown().unwrap();
        assert_eq!(stats.started, expected);
        assert_eq!(gate.created(), expected as usize);
    }
}

#[tokio::test]
async fn stop_on_idle_pool_finishes_immediately() {
    let mode = RunMode::Infinite;
    let pool = PoolController::new(instant, mode, 0, summary(mode, 0));

    pool.start().unwrap();
    assert!(!pool.is_finished());

    pool.request_stop().unwrap();
    assert!(pool.is_finished());
    assert_eq!(pool.phase(), Phase::Finished);
    pool.wait_until_finished().await;

    // Stopping a finished pool is harmless.
    pool.request_stop().unwrap();
}

#[tokio::test]
async fn empty_finite_run_finishes_on_start() {
    let mode = RunMode::Finite(0);
    let pool = PoolController::new(instant, mode, 8, summary(mode, 8));

    assert_eq!(pool.start().unwrap(), SpawnOutcome::default());
    assert!(pool.is_finished());
    assert_eq!(pool.stats().started, 0);
}

#[tracing_test::traced_test]
#[tokio::test]
async fn failing_factory_still_terminates_finite_run() {
    let mode = RunMode::Finite(5);
    let pool = PoolController::new(unavailable, mode, 2, summary(mode, 2));

    let outcome = pool.start().unwrap();
    assert_eq!(outcome, SpawnOutcome { started: 0, failed: 2 });

    finished(&pool).await;
    let stats = pool.teardown().unwrap();
    assert_eq!(stats.started, 5);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.failed, 5);
    assert_eq!(stats.succeeded(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_factory_infinite_run_stops() {
    let mode = RunMode::Infinite;
    let pool = PoolController::new(unavailable, mode, 3, summary(mode, 3));

    pool.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.request_stop().unwrap();
    finished(&pool).await;

    let stats = pool.stats();
    assert_consistent(&stats);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.failed, stats.completed);
    assert!(stats.started >= 3);
}

#[tokio::test]
async fn panicking_scenarios_count_as_failed() {
    let mode = RunMode::Finite(3);
    let pool = PoolController::new(panicking, mode, 3, summary(mode, 3));

    pool.start().unwrap();
    finished(&pool).await;

    let stats = pool.stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 3);
}

#[tracing_test::traced_test]
#[tokio::test]
async fn panicking_factory_still_terminates() {
    let calls = Arc::new(AtomicUsize::new(0));
    let factory = {
        let calls = calls.clone();
        move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                panic!("factory blew up");
            }
            instant()
        }
    };
    let mode = RunMode::Finite(3);
    let pool = PoolController::new(factory, mode, 1, summary(mode, 1));

    pool.start().unwrap();
    finished(&pool).await;

    let stats = pool.teardown().unwrap();
    assert_eq!(stats.started, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn repeated_target_spawns_once() {
    let gate = Gate::new();
    let mode = RunMode::Infinite;
    let summary = summary(mode, 2);
    let pool = PoolController::new(gate.factory(), mode, 2, summary.clone());
    pool.start().unwrap();

    assert_eq!(pool.set_target_concurrency(5).unwrap().started, 3);
    assert_eq!(pool.set_target_concurrency(5).unwrap().started, 0);
    assert_eq!(pool.current_active_count(), 5);
    assert_eq!(gate.created(), 5);

    // Both calls are logged even though the second changed nothing.
    assert_eq!(summary.changes().len(), 2);
}

#[tokio::test]
async fn target_set_before_start_applies_on_start() {
    let gate = Gate::new();
    let mode = RunMode::Finite(10);
    let pool = PoolController::new(gate.factory(), mode, 1, summary(mode, 1));

    assert_eq!(pool.set_target_concurrency(4).unwrap().attempted(), 0);
    assert_eq!(pool.current_active_count(), 0);

    assert_eq!(pool.start().unwrap().started, 4);
    assert_eq!(pool.current_active_count(), 4);
}

#[tokio::test]
async fn finite_target_above_remaining_is_capped() {
    let gate = Gate::new();
    let mode = RunMode::Finite(6);
    let pool = PoolController::new(gate.factory(), mode, 2, summary(mode, 2));
    pool.start().unwrap();

    assert_eq!(pool.set_target_concurrency(50).unwrap().started, 4);
    assert_eq!(pool.stats().started, 6);

    gate.release(6);
    finished(&pool).await;
    assert_eq!(pool.stats().started, 6);
}

#[tokio::test]
async fn lifecycle_order_is_enforced() {
    let gate = Gate::new();
    let mode = RunMode::Finite(1);
    let pool = PoolController::new(gate.factory(), mode, 1, summary(mode, 1));

    assert!(matches!(
        pool.teardown(),
        Err(PoolError::InvalidState {
            phase: Phase::NotStarted,
            ..
        })
    ));

    pool.start().unwrap();
    assert!(matches!(
        pool.start(),
        Err(PoolError::InvalidState {
            phase: Phase::Running,
            ..
        })
    ));
    assert!(pool.teardown().is_err());

    gate.release(1);
    finished(&pool).await;
    assert!(matches!(
        pool.set_target_concurrency(3),
        Err(PoolError::InvalidState {
            phase: Phase::Finished,
            ..
        })
    ));

    pool.teardown().unwrap();
    assert_eq!(pool.phase(), Phase::TornDown);
    assert!(pool.teardown().is_err());
    assert!(pool.set_target_concurrency(1).is_err());
    assert!(matches!(
        pool.request_stop(),
        Err(PoolError::InvalidState {
            phase: Phase::TornDown,
            ..
        })
    ));
}

#[test]
fn rejects_invalid_configuration() {
    let mode = RunMode::Infinite;
    let negative_concurrency = GeneratorConfig::new(-1, -4);
    let bad_call_count = GeneratorConfig::new(-9, 4);

    assert!(matches!(
        PoolController::from_config(instant, &negative_concurrency, summary(mode, 0)),
        Err(PoolError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        PoolController::from_config(instant, &bad_call_count, summary(mode, 0)),
        Err(PoolError::InvalidConfiguration(_))
    ));

    let pool = PoolController::from_config(instant, &GeneratorConfig::new(-1, 4), summary(mode, 4))
        .unwrap();
    assert_eq!(pool.mode(), RunMode::Infinite);
    assert_eq!(pool.stats().target, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn no_lost_wakeup_under_stress() {
    const TOTAL: u64 = 5_000;
    let mode = RunMode::Finite(TOTAL);
    let pool = PoolController::new(instant, mode, 64, summary(mode, 64));

    let waiters: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.wait_until_finished().await })
        })
        .collect();

    // Reshape the pool while completions pour in; stops once the run is over.
    let resizer = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut rng = SmallRng::from_entropy();
            while pool.set_target_concurrency(rng.gen_range(1..128)).is_ok() {
                assert_consistent(&pool.stats());
                tokio::task::yield_now().await;
            }
        })
    };

    pool.start().unwrap();

    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(30), waiter)
            .await
            .expect("waiter was never released")
            .unwrap();
    }
    resizer.await.unwrap();

    let stats = pool.teardown().unwrap();
    assert_eq!(stats.started, TOTAL);
    assert_eq!(stats.completed, TOTAL);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.failed, 0);
}
