//! The singleton drain loop.
//!
//! [`SizingWorker::start_draining`] is safe to call from anywhere at any
//! time: while a drain runs, further calls return `None` at once. The drain
//! pops tokens in FIFO order and runs each in its own task, so a panic in
//! one item is counted like any other failure.
//!
//! A drain ends when
//! - the queue is found empty after at least one item was processed,
//! - the queue stayed empty for `max_idle_polls` polls from the start, or
//! - it is cancelled through [`SizingWorker::stop_draining`] or shutdown.
//!
//! Cancellation is checked between items; an item that has started runs
//! until it finishes or hits its own timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use valvesize_core::work_key::WorkKey;
use valvesize_pipeline::{JobError, JobOutcome, SessionDriver};

use crate::drain::{DrainReport, DrainSession};
use crate::events::{EventBus, JobEvent};
use crate::queue::{Consumer, JobQueue};

/// Default sleep between polls of an empty queue.
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of empty polls before a drain that never saw an item ends.
pub const DEFAULT_MAX_IDLE_POLLS: u32 = 20;

/// Idle backoff of the drain loop.
#[derive(Debug, Clone, Copy)]
pub struct DrainConfig {
    pub idle_poll_interval: Duration,
    pub max_idle_polls: u32,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval: DEFAULT_IDLE_POLL_INTERVAL,
            max_idle_polls: DEFAULT_MAX_IDLE_POLLS,
        }
    }
}

/// Point-in-time view of the worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub is_processing: bool,
    pub queue_depth: usize,
    pub last_drain: Option<DrainReport>,
}

pub struct SizingWorker {
    queue: Arc<JobQueue>,
    driver: Arc<SessionDriver>,
    events: Arc<EventBus>,
    config: DrainConfig,
    is_processing: AtomicBool,
    /// Cancels the drain in progress. Replaced at the start of each drain,
    /// under this lock and together with raising `is_processing`.
    drain_cancel: Mutex<CancellationToken>,
    /// Parent of every drain token; cancelled once on shutdown.
    shutdown: CancellationToken,
    last_report: Mutex<Option<DrainReport>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the processing flag however the drain ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SizingWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        driver: Arc<SessionDriver>,
        events: Arc<EventBus>,
        config: DrainConfig,
    ) -> Self {
        Self {
            queue,
            driver,
            events,
            config,
            is_processing: AtomicBool::new(false),
            drain_cancel: Mutex::new(CancellationToken::new()),
            shutdown: CancellationToken::new(),
            last_report: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn driver(&self) -> &Arc<SessionDriver> {
        &self.driver
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Append a token to the queue. Does not start a drain.
    pub fn enqueue(&self, token: impl Into<String>) {
        self.queue.enqueue(token);
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<DrainReport> {
        lock(&self.last_report).clone()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            is_processing: self.is_processing(),
            queue_depth: self.queue.depth(),
            last_drain: self.last_report(),
        }
    }

    /// Drain the queue unless a drain is already running.
    ///
    /// Returns the report of the drain this call ran, or `None` when another
    /// drain was active. Tokens that arrive after a drain saw the queue empty
    /// but before it released the flag are picked up by a follow-up drain in
    /// the same call.
    pub async fn start_draining(&self) -> Option<DrainReport> {
        let mut report = None;
        loop {
            let Some(cancel) = self.claim() else {
                if report.is_none() {
                    tracing::debug!("Drain already active, start ignored");
                }
                return report;
            };

            let finished = {
                let _guard = ProcessingGuard(&self.is_processing);
                self.drain(cancel.clone()).await
            };

            *lock(&self.last_report) = Some(finished.clone());
            // A stop that lands after the last item still ends this call.
            let stop = finished.cancelled || cancel.is_cancelled() || self.queue.is_empty();
            report = Some(finished);
            if stop {
                return report;
            }
        }
    }

    /// Raise the processing flag and install a fresh drain token, or return
    /// `None` when a drain already holds the flag.
    fn claim(&self) -> Option<CancellationToken> {
        let mut current = lock(&self.drain_cancel);
        self.is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let cancel = self.shutdown.child_token();
        *current = cancel.clone();
        Some(cancel)
    }

    /// Ask the running drain to stop after its current item.
    ///
    /// Returns `false` when no drain was running.
    pub fn stop_draining(&self) -> bool {
        let current = lock(&self.drain_cancel);
        if !self.is_processing() {
            return false;
        }
        tracing::info!("Drain stop requested");
        current.cancel();
        true
    }

    /// Stop the current drain and make every later drain end at once.
    ///
    /// Also closes the engine slot, so an item still waiting for it fails
    /// at once. The item holding the slot runs to its end.
    pub fn shutdown(&self) {
        tracing::info!("Worker shutting down");
        self.shutdown.cancel();
        self.driver.gate().close();
    }

    async fn drain(&self, cancel: CancellationToken) -> DrainReport {
        let mut session = DrainSession::start();
        let drain_id = session.id();
        tracing::info!(%drain_id, queue_depth = self.queue.depth(), "Drain started");
        self.events.publish(JobEvent::DrainStarted { drain_id });

        let mut consumer = self.queue.consumer().await;
        let cancelled = self.run_loop(&mut session, &mut consumer, &cancel).await;
        drop(consumer);

        let report = session.finish(cancelled);
        tracing::info!(
            %drain_id,
            success_count = report.success_count,
            error_count = report.error_count,
            cancelled,
            "Drain finished",
        );
        self.events.publish(JobEvent::DrainFinished {
            report: report.clone(),
        });
        report
    }

    /// Returns whether the loop stopped because it was cancelled.
    async fn run_loop(
        &self,
        session: &mut DrainSession,
        consumer: &mut Consumer<'_>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut processed_any = false;
        let mut idle_polls = 0;

        loop {
            if cancel.is_cancelled() {
                return true;
            }

            match consumer.try_pop() {
                Some(token) => {
                    processed_any = true;
                    self.process(session, token).await;
                }
                None if processed_any => return false,
                None => {
                    idle_polls += 1;
                    if idle_polls > self.config.max_idle_polls {
                        tracing::debug!(drain_id = %session.id(), "Queue stayed empty, drain ends");
                        return false;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return true,
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Run one item and count the outcome. Never fails.
    async fn process(&self, session: &mut DrainSession, token: String) {
        let drain_id = session.id();
        match self.run_item(&token).await {
            Ok(outcome) => {
                session.record_success();
                tracing::info!(
                    %drain_id,
                    work_key = %outcome.key,
                    results_stored = outcome.results_stored,
                    parameters_rejected = outcome.parameters_rejected,
                    "Sizing job succeeded",
                );
                self.events.publish(JobEvent::JobSucceeded {
                    drain_id,
                    work_key: outcome.key.token(),
                    results_stored: outcome.results_stored,
                });
            }
            Err(e) => {
                session.record_error();
                tracing::error!(
                    %drain_id,
                    token = %token,
                    category = e.category(),
                    error = %e,
                    "Sizing job failed",
                );
                self.events.publish(JobEvent::JobFailed {
                    drain_id,
                    token,
                    category: e.category(),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn run_item(&self, token: &str) -> Result<JobOutcome, JobError> {
        let key = WorkKey::parse(token)?;
        let driver = Arc::clone(&self.driver);
        let task = tokio::spawn(async move { driver.run(&key).await });
        match task.await {
            Ok(result) => result,
            Err(join_error) => Err(JobError::Panicked(panic_message(join_error))),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(_) => "task failed".to_string(),
    }
}
