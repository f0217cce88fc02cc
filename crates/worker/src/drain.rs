//! Per-drain bookkeeping.
//!
//! A [`DrainSession`] exists while the worker loop runs. Its counters start
//! at zero and are frozen into a [`DrainReport`] when the loop ends.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use valvesize_core::types::Timestamp;

/// Counters of the drain in progress.
#[derive(Debug)]
pub struct DrainSession {
    id: Uuid,
    started_at: Timestamp,
    success_count: u32,
    error_count: u32,
}

impl DrainSession {
    pub fn start() -> Self {
        Self {
            id: Uuid::now_v7(),
            started_at: Utc::now(),
            success_count: 0,
            error_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// End the drain. `cancelled` is set when it stopped on request
    /// rather than by emptying the queue.
    pub fn finish(self, cancelled: bool) -> DrainReport {
        DrainReport {
            id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            success_count: self.success_count,
            error_count: self.error_count,
            cancelled,
        }
    }
}

/// Final counters of a finished drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub success_count: u32,
    pub error_count: u32,
    pub cancelled: bool,
}

impl DrainReport {
    pub fn processed(&self) -> u32 {
        self.success_count + self.error_count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
