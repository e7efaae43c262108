//! Tests for scope lifecycle, fail-fast cancellation and result access.

use super::*;
use crate::errors::{FetchError, ResultAccessError, TaskError};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn fetch_failure(item: &str) -> TaskError {
    TaskError::Fetch {
        item: item.to_string(),
        source: FetchError::NotFound(item.to_string()),
    }
}

/// Sleeps for `ms` unless the scope is cancelled first.
async fn cooperative_sleep(ctx: &TaskContext, ms: u64) -> Result<(), TaskError> {
    ctx.run_until_cancelled(tokio::time::sleep(Duration::from_millis(ms)))
        .await
        .ok_or(TaskError::Cancelled)
}

async fn wait_for_state<T: Send + 'static>(scope: &Scope<T>, wanted: ScopeState) {
    for _ in 0..200 {
        if scope.state() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scope never reached {wanted}");
}

#[tokio::test]
async fn test_scope_success() {
    let mut scope = Scope::new("numbers");
    let handles: Vec<_> = (0..3)
        .map(|i| scope.spawn(format!("task-{i}"), move |_ctx| async move { Ok(i * 10) }).unwrap())
        .collect();

    assert_eq!(scope.len(), 3);
    let summary = tokio_test::assert_ok!(scope.join().await);
    assert_eq!(summary.spawned, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.cancelled, 0);

    let outputs: Vec<i32> = handles.into_iter().map(|h| h.into_output().unwrap()).collect();
    assert_eq!(outputs, vec![0, 10, 20]);
}

#[tokio::test]
async fn test_empty_scope_joins() {
    let scope: Scope<()> = Scope::new("empty");
    assert!(scope.is_empty());

    let summary = scope.join().await.unwrap();
    assert_eq!(summary.spawned, 0);
    assert_eq!(summary.completed, 0);
}

#[tokio::test]
async fn test_handles_keep_spawn_order_despite_completion_order() {
    let finished = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut scope = Scope::new("ordered");

    let handles: Vec<_> = (0..5u64)
        .map(|i| {
            let finished = finished.clone();
            scope
                .spawn(format!("task-{i}"), move |_ctx| async move {
                    // Later tasks finish first.
                    tokio::time::sleep(Duration::from_millis((5 - i) * 15)).await;
                    finished.lock().push(i);
                    Ok(i)
                })
                .unwrap()
        })
        .collect();

    scope.join().await.unwrap();

    assert_eq!(*finished.lock(), vec![4, 3, 2, 1, 0]);
    let outputs: Vec<u64> = handles.into_iter().map(|h| h.into_output().unwrap()).collect();
    assert_eq!(outputs, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_first_failure_cancels_siblings() {
    let mut scope: Scope<&'static str> = Scope::new("fetch");
    let token = scope.cancel_token().clone();

    let slow: Vec<_> = (0..3)
        .map(|i| {
            scope
                .spawn(format!("slow-{i}"), |ctx| async move {
                    cooperative_sleep(&ctx, 10_000).await?;
                    Ok("never")
                })
                .unwrap()
        })
        .collect();
    scope
        .spawn("failing", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(fetch_failure("u2"))
        })
        .unwrap();

    let started = std::time::Instant::now();
    let failure = tokio_test::assert_err!(scope.join().await);
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(failure.scope, "fetch");
    assert_eq!(failure.cause.item(), Some("u2"));
    assert_eq!(failure.suppressed, 0);
    assert!(token.is_cancelled());
    for handle in &slow {
        assert_eq!(handle.state(), TaskState::Cancelled);
    }
}

#[tokio::test]
async fn test_task_without_check_point_runs_to_completion() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut scope: Scope<()> = Scope::new("stubborn");

    let counter_clone = counter.clone();
    let stubborn = scope
        .spawn("stubborn", move |_ctx| async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .unwrap();
    scope
        .spawn("failing", |_ctx| async { Err(fetch_failure("bad")) })
        .unwrap();

    assert!(scope.join().await.is_err());

    // Join waited for the task that ignored cancellation.
    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert_eq!(stubborn.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_spawn_rejected_after_failure() {
    let mut scope: Scope<()> = Scope::new("transform");
    scope
        .spawn("failing", |_ctx| async { Err(fetch_failure("x")) })
        .unwrap();

    wait_for_state(&scope, ScopeState::ShuttingDown).await;

    let err = scope.spawn("late", |_ctx| async { Ok(()) }).unwrap_err();
    assert_eq!(err.scope, "transform");
    assert_eq!(err.task, "late");
    assert_eq!(err.state, ScopeState::ShuttingDown);
    assert_eq!(scope.len(), 1);

    assert!(scope.join().await.is_err());
}

#[tokio::test]
async fn test_concurrent_failures_keep_exactly_one() {
    let barrier = Arc::new(Barrier::new(5));
    let mut scope: Scope<()> = Scope::new("burst");

    for i in 0..5 {
        let barrier = barrier.clone();
        scope
            .spawn(format!("fail-{i}"), move |_ctx| async move {
                barrier.wait().await;
                Err(fetch_failure(&format!("u{i}")))
            })
            .unwrap();
    }

    let failure = scope.join().await.unwrap_err();
    assert!(failure.cause.item().is_some_and(|item| item.starts_with('u')));
    assert_eq!(failure.suppressed, 4);
}

fn explode() -> Result<u8, TaskError> {
    panic!("kaboom")
}

#[tokio::test]
async fn test_panicking_task_fails_scope() {
    let mut scope: Scope<u8> = Scope::new("panics");
    scope
        .spawn("explodes", |_ctx| async { explode() })
        .unwrap();

    let failure = scope.join().await.unwrap_err();
    match failure.cause {
        TaskError::Panicked { task, message } => {
            assert_eq!(task, "explodes");
            assert_eq!(message, "kaboom");
        }
        other => panic!("unexpected cause: {other}"),
    }
}

#[tokio::test]
async fn test_panic_while_building_future_fails_scope() {
    let mut scope: Scope<u8> = Scope::new("eager-panic");
    let eager = scope
        .spawn("eager", |_ctx| -> std::future::Ready<Result<u8, TaskError>> {
            panic!("before first poll")
        })
        .unwrap();
    let sibling = scope.spawn("sibling", |_ctx| async { Ok(1) }).unwrap();

    let failure = scope.join().await.unwrap_err();
    match failure.cause {
        TaskError::Panicked { task, message } => {
            assert_eq!(task, "eager");
            assert_eq!(message, "before first poll");
        }
        other => panic!("unexpected cause: {other}"),
    }
    assert_eq!(eager.state(), TaskState::Failed);
    assert!(sibling.is_finished());
    assert!(matches!(
        eager.into_output(),
        Err(ResultAccessError::ScopeFailed { .. })
    ));
}

#[tokio::test]
async fn test_manual_shutdown() {
    let mut scope: Scope<u32> = Scope::new("manual");
    let quick = scope.spawn("quick", |_ctx| async { Ok(7) }).unwrap();
    let slow = scope
        .spawn("slow", |ctx| async move {
            cooperative_sleep(&ctx, 10_000).await?;
            Ok(1)
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    scope.shutdown();
    assert_eq!(scope.state(), ScopeState::ShuttingDown);
    assert!(scope.spawn("rejected", |_ctx| async { Ok(0) }).is_err());

    let summary = scope.join().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.cancelled, 1);

    assert_eq!(quick.into_output().unwrap(), 7);
    assert_eq!(
        slow.into_output().unwrap_err(),
        ResultAccessError::NotCompleted {
            task: "slow".to_string(),
            state: TaskState::Cancelled,
        }
    );
}

#[tokio::test]
async fn test_result_before_join_is_rejected() {
    let mut scope: Scope<u32> = Scope::new("early");
    let handle = scope.spawn("value", |_ctx| async { Ok(1) }).unwrap();
    let peek = scope.spawn("peek", |_ctx| async { Ok(2) }).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        peek.into_output().unwrap_err(),
        ResultAccessError::NotJoined {
            scope: "early".to_string(),
            task: "peek".to_string(),
        }
    );

    scope.join().await.unwrap();
    assert_eq!(handle.into_output().unwrap(), 1);
}

#[tokio::test]
async fn test_result_after_failed_join_is_rejected() {
    let mut scope: Scope<u32> = Scope::new("failed");
    let ok = scope.spawn("ok", |_ctx| async { Ok(1) }).unwrap();
    scope
        .spawn("bad", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(fetch_failure("bad"))
        })
        .unwrap();

    scope.join().await.unwrap_err();

    assert_eq!(ok.state(), TaskState::Completed);
    assert!(matches!(
        ok.into_output(),
        Err(ResultAccessError::ScopeFailed { .. })
    ));
}

#[tokio::test]
async fn test_concurrency_cap() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut scope: Scope<()> = Scope::with_config(ScopeConfig::new("capped").with_max_concurrency(2));

    for i in 0..8 {
        let running = running.clone();
        let peak = peak.clone();
        scope
            .spawn(format!("task-{i}"), move |_ctx| async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }

    let summary = scope.join().await.unwrap();
    assert_eq!(summary.completed, 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_pending_tasks_cancelled_while_waiting_for_permit() {
    let mut scope: Scope<()> = Scope::with_config(ScopeConfig::new("queued").with_max_concurrency(1));

    scope
        .spawn("failing", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(fetch_failure("first"))
        })
        .unwrap();
    let queued = scope.spawn("queued", |_ctx| async { Ok(()) }).unwrap();

    assert!(scope.join().await.is_err());
    assert_eq!(queued.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_join_deadline() {
    let mut scope: Scope<()> = Scope::with_config(
        ScopeConfig::new("deadline").with_timeout(Duration::from_millis(50)),
    );
    let slow = scope
        .spawn("slow", |ctx| async move { cooperative_sleep(&ctx, 10_000).await })
        .unwrap();

    let started = std::time::Instant::now();
    let failure = scope.join().await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(failure.cause, TaskError::TimedOut(d) if d == Duration::from_millis(50)));
    assert_eq!(slow.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_drop_without_join_cancels() {
    let mut scope: Scope<()> = Scope::new("dropped");
    let token = scope.cancel_token().clone();
    let handle = scope
        .spawn("slow", |ctx| async move { cooperative_sleep(&ctx, 10_000).await })
        .unwrap();

    drop(scope);

    assert!(token.is_cancelled());
    assert!(matches!(
        handle.into_output(),
        Err(ResultAccessError::NotJoined { .. })
    ));
}

#[tokio::test]
async fn test_checkpoint_observes_cancellation() {
    let mut scope: Scope<usize> = Scope::new("checkpoints");
    let steps = scope
        .spawn("stepper", |ctx| async move {
            let mut done = 0;
            for _ in 0..100 {
                ctx.checkpoint()?;
                tokio::time::sleep(Duration::from_millis(5)).await;
                done += 1;
            }
            Ok(done)
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    scope.shutdown();
    scope.join().await.unwrap();

    assert_eq!(steps.state(), TaskState::Cancelled);
}
