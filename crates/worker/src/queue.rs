//! Unbounded FIFO of raw work-key tokens.
//!
//! Tokens are queued as submitted and only parsed when popped, so a
//! malformed token is seen (and counted) by the drain that pops it.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Multi-producer queue with a single consuming drain.
pub struct JobQueue {
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
    depth: AtomicUsize,
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            depth: AtomicUsize::new(0),
        }
    }

    /// Append a token. Never blocks.
    pub fn enqueue(&self, token: impl Into<String>) {
        // Counted before the send so a racing pop never takes depth below zero.
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        // The receiver lives as long as the queue, so sending cannot fail.
        if self.sender.send(token.into()).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        tracing::debug!(depth, "Work item enqueued");
    }

    /// Tokens waiting to be popped. May briefly count a token whose send is
    /// still in progress.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Exclusive consumer access for the duration of a drain.
    pub async fn consumer(&self) -> Consumer<'_> {
        Consumer {
            receiver: self.receiver.lock().await,
            depth: &self.depth,
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The consuming end, held by the active drain.
pub struct Consumer<'a> {
    receiver: MutexGuard<'a, mpsc::UnboundedReceiver<String>>,
    depth: &'a AtomicUsize,
}

impl Consumer<'_> {
    /// Pop the oldest token, if any, without waiting.
    pub fn try_pop(&mut self) -> Option<String> {
        let token = self.receiver.try_recv().ok()?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(token)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
