use std::time::Duration;

use valvesize_core::error::CoreError;
use valvesize_db::store::StoreError;
use valvesize_engine::session::EngineError;

/// Why a single work item failed.
///
/// Every variant fails the item and is counted; none stops the drain.
/// Partial-field failures never surface here, they are logged where they
/// happen.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The queue token did not parse as a work key.
    #[error("Malformed work key: {0}")]
    MalformedKey(#[from] CoreError),

    /// The engine slot was not free within the wait bound.
    #[error("Engine slot not available within {0:?}")]
    AdmissionTimeout(Duration),

    /// The engine slot gate was closed by shutdown.
    #[error("Engine slot gate closed")]
    GateClosed,

    /// The engine failed a mandatory step.
    #[error("Engine failed during {stage}: {source}")]
    Engine {
        stage: &'static str,
        #[source]
        source: EngineError,
    },

    /// The calculation ran past its bound and was abandoned.
    #[error("Calculation did not finish within {0:?}")]
    CalculationTimeout(Duration),

    /// The request could not be loaded or the result not stored.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The private working file could not be prepared.
    #[error("Working artifact error: {0}")]
    Artifact(#[source] EngineError),

    /// The task running the item panicked.
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Stable category name for logs and events.
    pub fn category(&self) -> &'static str {
        match self {
            JobError::MalformedKey(_) => "malformed_key",
            JobError::AdmissionTimeout(_) | JobError::GateClosed => "admission",
            JobError::Engine { .. } => "engine",
            JobError::CalculationTimeout(_) => "calculation_timeout",
            JobError::Persistence(_) => "persistence",
            JobError::Artifact(_) => "artifact",
            JobError::Panicked(_) => "panic",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
