//! The engine contract: open a session on a working file, exchange named
//! parameters, calculate, save/export, close.
//!
//! Implementations pass values through unchanged. Kind coercion lives in
//! `valvesize_core::codec`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use valvesize_core::codec::{EngineValue, ParamKind};

/// Derived artifacts a session can export next to its working file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// Machine-readable snapshot of inputs and outputs.
    Snapshot,
    /// Human-readable calculation report.
    Report,
}

impl ExportKind {
    pub const ALL: [ExportKind; 2] = [ExportKind::Snapshot, ExportKind::Report];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportKind::Snapshot => "snapshot",
            ExportKind::Report => "report",
        }
    }

    /// File suffix appended to the work key.
    pub fn file_suffix(self) -> &'static str {
        match self {
            ExportKind::Snapshot => "snapshot.json",
            ExportKind::Report => "report.html",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(ExportKind::Snapshot),
            "report" => Ok(ExportKind::Report),
            other => Err(EngineError::Protocol(format!("Unknown export kind '{other}'"))),
        }
    }
}

/// Errors from an engine connector or session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine is not installed or not reachable on this host.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// The engine answered but refused the operation.
    #[error("Engine rejected {op}: {message}")]
    Rejected { op: &'static str, message: String },

    /// The engine's reply could not be understood, or the session is no
    /// longer in a usable state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The engine did not answer `op` within the bound.
    #[error("Engine did not answer {op} within {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The session was already closed.
    #[error("Session closed")]
    Closed,

    /// Local I/O failed (spawn, pipes, working file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One open session against a private working file.
///
/// At most one is open at a time; callers enforce that with the admission
/// gate. `close` must be called exactly once on every path. Dropping a
/// session without closing it releases local resources but may leave the
/// engine side unclean.
#[async_trait]
pub trait EngineSession: Send {
    /// Set one named input.
    async fn set_parameter(&mut self, name: &str, value: &EngineValue) -> Result<(), EngineError>;

    /// Read one named parameter as `kind`.
    async fn get_parameter(
        &mut self,
        name: &str,
        kind: ParamKind,
    ) -> Result<EngineValue, EngineError>;

    /// Run the sizing calculation on the current inputs.
    async fn calculate(&mut self) -> Result<(), EngineError>;

    /// Persist the session's working file in place.
    async fn save(&mut self) -> Result<(), EngineError>;

    /// Write a derived artifact to `path`.
    async fn export(&mut self, kind: ExportKind, path: &Path) -> Result<(), EngineError>;

    /// End the session and release engine-side resources.
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Opens sessions against working files.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Whether the engine can be used on this host. Probed once; later
    /// calls return the cached answer.
    fn is_available(&self) -> bool;

    /// Open a session on the working file at `artifact`.
    async fn open(&self, artifact: &Path) -> Result<Box<dyn EngineSession>, EngineError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
