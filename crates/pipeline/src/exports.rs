//! Where a job's exported artifacts live.
//!
//! ```text
//! <results_dir>/<request_id>/<request_id>_<sheet_id>.snapshot.json
//! <results_dir>/<request_id>/<request_id>_<sheet_id>.report.html
//! ```

use std::path::{Path, PathBuf};

use valvesize_core::work_key::WorkKey;
use valvesize_engine::session::ExportKind;

/// Deterministic export locations for one work key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
    snapshot: PathBuf,
    report: PathBuf,
}

impl ArtifactPaths {
    /// Paths for `key` under `results_dir`.
    ///
    /// Returns `None` when the request id cannot be used as a single path
    /// component.
    pub fn for_job(results_dir: &Path, key: &WorkKey) -> Option<Self> {
        let request_id = key.request_id();
        if !is_plain_component(request_id) {
            return None;
        }

        let dir = results_dir.join(request_id);
        let file = |kind: ExportKind| dir.join(format!("{key}.{}", kind.file_suffix()));
        Some(Self {
            snapshot: file(ExportKind::Snapshot),
            report: file(ExportKind::Report),
            dir,
        })
    }

    /// Directory shared by all sheets of the request.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: ExportKind) -> &Path {
        match kind {
            ExportKind::Snapshot => &self.snapshot,
            ExportKind::Report => &self.report,
        }
    }
}

fn is_plain_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
