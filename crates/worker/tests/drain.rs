//! Drain loop behaviour against the loopback engine.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use tokio::sync::Barrier;
use valvesize_core::work_key::WorkKey;
use valvesize_engine::loopback::LoopbackEngine;
use valvesize_pipeline::JobError;
use valvesize_worker::events::JobEvent;

fn key(token: &str) -> WorkKey {
    WorkKey::parse(token).unwrap()
}

// -- ordering and counting ----------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_producers_one_drain_in_fifo_order() {
    let fx = Fixture::new(engine_with_outputs());
    let mut rx = fx.events.subscribe();
    let start = Arc::new(Barrier::new(2));
    // Records the order the producers actually sent in.
    let sent = Arc::new(Mutex::new(Vec::new()));

    let producer = |token: &'static str| {
        let worker = Arc::clone(&fx.worker);
        let start = Arc::clone(&start);
        let sent = Arc::clone(&sent);
        tokio::spawn(async move {
            start.wait().await;
            let mut sent = sent.lock().unwrap();
            sent.push(token.to_string());
            worker.enqueue(token);
        })
    };
    let (a, b) = tokio::join!(producer("REQ-100_1"), producer("REQ-100_2"));
    a.unwrap();
    b.unwrap();

    let report = fx.worker.start_draining().await.unwrap();
    assert_eq!(report.success_count, 2);
    assert_eq!(report.error_count, 0);
    assert!(!report.cancelled);
    assert_eq!(fx.worker.queue().depth(), 0);

    let mut succeeded = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::JobSucceeded { work_key, .. } = event {
            succeeded.push(work_key);
        }
    }
    assert_eq!(succeeded, *sent.lock().unwrap());
    assert!(fx.store.result(&key("REQ-100_1")).is_some());
    assert!(fx.store.result(&key("REQ-100_2")).is_some());
}

#[tokio::test]
async fn concurrent_starts_run_exactly_one_drain() {
    let fx = Fixture::new(LoopbackEngine::new().calculate_delay(Duration::from_millis(50)));
    fx.worker.enqueue("REQ-1_1");
    fx.worker.enqueue("REQ-1_2");

    let (a, b) = tokio::join!(fx.worker.start_draining(), fx.worker.start_draining());

    assert_eq!([a.is_some(), b.is_some()].iter().filter(|ran| **ran).count(), 1);
    let report = a.or(b).unwrap();
    assert_eq!(report.success_count, 2);
    assert_eq!(fx.engine.max_concurrent_sessions(), 1);
}

#[tokio::test]
async fn start_while_draining_returns_immediately() {
    let fx = Fixture::new(LoopbackEngine::new().calculate_delay(Duration::from_millis(200)));
    fx.worker.enqueue("REQ-1_1");

    let worker = Arc::clone(&fx.worker);
    let running = tokio::spawn(async move { worker.start_draining().await });
    while !fx.worker.is_processing() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = std::time::Instant::now();
    assert!(fx.worker.start_draining().await.is_none());
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(running.await.unwrap().is_some());
}

#[tokio::test]
async fn counters_reset_for_each_drain() {
    let fx = Fixture::new(LoopbackEngine::new());
    fx.worker.enqueue("REQ-1_1");
    fx.worker.enqueue("bad-token");
    let first = fx.worker.start_draining().await.unwrap();
    assert_eq!((first.success_count, first.error_count), (1, 1));

    fx.worker.enqueue("REQ-1_2");
    let second = fx.worker.start_draining().await.unwrap();
    assert_eq!((second.success_count, second.error_count), (1, 0));
    assert_ne!(first.id, second.id);
    assert_eq!(fx.worker.last_report(), Some(second));
}

#[tokio::test]
async fn empty_queue_drain_ends_after_idle_polls() {
    let fx = Fixture::new(LoopbackEngine::new());

    let report = tokio::time::timeout(Duration::from_secs(1), fx.worker.start_draining())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.processed(), 0);
    assert!(!fx.worker.is_processing());
}

#[tokio::test]
async fn item_enqueued_during_idle_backoff_is_processed() {
    let fx = Fixture::new(LoopbackEngine::new());
    let worker = Arc::clone(&fx.worker);
    let running = tokio::spawn(async move { worker.start_draining().await });

    tokio::time::sleep(Duration::from_millis(15)).await;
    fx.worker.enqueue("REQ-9_1");

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.success_count, 1);
}

// -- failures -----------------------------------------------------------------

#[tokio::test]
async fn malformed_tokens_count_as_errors_and_open_nothing() {
    let fx = Fixture::new(LoopbackEngine::new());
    let mut rx = fx.events.subscribe();
    for token in ["REQ-100", "REQ_1_2", "REQ-100_x", "_1"] {
        fx.worker.enqueue(token);
    }

    let report = fx.worker.start_draining().await.unwrap();

    assert_eq!(report.error_count, 4);
    assert_eq!(report.success_count, 0);
    assert_eq!(fx.engine.sessions_opened(), 0);
    assert_eq!(fx.residual_files(), 0);

    let mut categories = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::JobFailed { category, .. } = event {
            categories.push(category);
        }
    }
    assert_eq!(categories, ["malformed_key"; 4]);
}

#[tokio::test]
async fn failures_do_not_stop_the_loop() {
    let fx = Fixture::new(engine_with_outputs());
    fx.store.fail_result_upserts(true);
    fx.worker.enqueue("REQ-1_1");
    fx.worker.enqueue("not-a-key");
    fx.worker.enqueue("REQ-1_2");

    let report = fx.worker.start_draining().await.unwrap();

    assert_eq!(report.error_count, 3);
    assert_eq!(fx.engine.sessions_opened(), 2);
    assert!(fx.worker.queue().is_empty());
}

#[tokio::test]
async fn held_slot_times_out_without_artifact() {
    let fx = Fixture::with_config(LoopbackEngine::new(), |c| {
        c.slot_timeout = Duration::from_millis(50);
    });
    let held = fx.worker.driver().gate().clone().try_acquire_owned().unwrap();
    fx.worker.enqueue("REQ-1_1");

    let report = fx.worker.start_draining().await.unwrap();

    assert_eq!(report.error_count, 1);
    assert_eq!(fx.engine.sessions_opened(), 0);
    assert!(!fx.work_dir().exists());
    drop(held);
}

#[tokio::test]
async fn panicking_item_is_isolated_and_cleaned_up() {
    let fx = Fixture::new(LoopbackEngine::new().panic_on_calculate());
    let mut rx = fx.events.subscribe();
    fx.worker.enqueue("REQ-1_1");
    fx.worker.enqueue("REQ-1_2");

    let report = fx.worker.start_draining().await.unwrap();

    assert_eq!(report.error_count, 2);
    assert_eq!(fx.engine.sessions_opened(), 2);
    assert_eq!(fx.engine.open_sessions(), 0);
    assert_eq!(fx.residual_files(), 0);
    assert_eq!(fx.worker.driver().gate().available_permits(), 1);

    let panicked = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| matches!(e, JobEvent::JobFailed { category: "panic", .. }))
        .count();
    assert_eq!(panicked, 2);
}

// -- cancellation -------------------------------------------------------------

#[tokio::test]
async fn stop_draining_finishes_current_item_only() {
    let fx = Fixture::new(LoopbackEngine::new().calculate_delay(Duration::from_millis(200)));
    for sheet in 1..=3 {
        fx.worker.enqueue(format!("REQ-1_{sheet}"));
    }

    let worker = Arc::clone(&fx.worker);
    let running = tokio::spawn(async move { worker.start_draining().await });
    while fx.engine.sessions_opened() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(fx.worker.stop_draining());

    let report = running.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.success_count, 1);
    assert_eq!(fx.engine.sessions_opened(), 1);
    assert_eq!(fx.worker.queue().depth(), 2);
    assert!(!fx.worker.is_processing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_accepted_as_a_drain_starts_is_honoured() {
    for _ in 0..10 {
        let fx = Fixture::new(LoopbackEngine::new().calculate_delay(Duration::from_millis(20)));
        for sheet in 1..=3 {
            fx.worker.enqueue(format!("REQ-1_{sheet}"));
        }

        let worker = Arc::clone(&fx.worker);
        let running = tokio::spawn(async move { worker.start_draining().await });
        while !fx.worker.stop_draining() {
            tokio::task::yield_now().await;
        }

        let report = running.await.unwrap().unwrap();
        assert!(report.cancelled);
        assert!(report.processed() <= 1);
        assert!(fx.worker.queue().depth() >= 2);
    }
}

#[tokio::test]
async fn stop_without_drain_is_a_no_op() {
    let fx = Fixture::new(LoopbackEngine::new());
    assert!(!fx.worker.stop_draining());

    fx.worker.enqueue("REQ-1_1");
    let report = fx.worker.start_draining().await.unwrap();
    assert_eq!(report.success_count, 1);
}

#[tokio::test]
async fn shutdown_cancels_later_drains() {
    let fx = Fixture::new(LoopbackEngine::new());
    fx.worker.shutdown();
    fx.worker.enqueue("REQ-1_1");

    let report = fx.worker.start_draining().await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed(), 0);
    assert_eq!(fx.worker.queue().depth(), 1);
}

#[tokio::test]
async fn shutdown_closes_the_engine_slot() {
    let fx = Fixture::new(LoopbackEngine::new());
    fx.worker.shutdown();

    let err = fx.worker.driver().run(&key("REQ-1_1")).await.unwrap_err();

    assert_matches!(err, JobError::GateClosed);
    assert_eq!(err.category(), "admission");
    assert_eq!(fx.engine.sessions_opened(), 0);
}
