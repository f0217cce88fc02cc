//! Private working copies of the engine template.
//!
//! Every session runs against its own copy of the read-only template so
//! that concurrent or historical runs never share mutable state. The copy
//! is deleted by [`WorkingArtifact::remove`]; if that is never reached the
//! `Drop` impl removes it synchronously.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use crate::session::EngineError;

/// A uniquely named copy of the template, owned by exactly one session.
#[derive(Debug)]
pub struct WorkingArtifact {
    path: PathBuf,
    removed: bool,
}

impl WorkingArtifact {
    /// Copy `template` into `work_dir` under a fresh random name.
    ///
    /// The name keeps the template's stem and extension (engines often
    /// dispatch on the extension) with a UUID v4 suffix. The copy is made
    /// writable even if the template is read-only.
    pub async fn materialize(template: &Path, work_dir: &Path) -> Result<Self, EngineError> {
        Self::materialize_with(template, work_dir, |from, to| tokio::fs::copy(from, to)).await
    }

    async fn materialize_with<F, Fut>(
        template: &Path,
        work_dir: &Path,
        copy: F,
    ) -> Result<Self, EngineError>
    where
        F: FnOnce(PathBuf, PathBuf) -> Fut,
        Fut: Future<Output = io::Result<u64>>,
    {
        tokio::fs::create_dir_all(work_dir).await?;

        let stem = template
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sizing");
        let suffix = uuid::Uuid::new_v4().simple();
        let file_name = match template.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}-{suffix}.{ext}"),
            None => format!("{stem}-{suffix}"),
        };
        // Owned before the copy starts, so `Drop` also clears a partial copy.
        let artifact = Self {
            path: work_dir.join(file_name),
            removed: false,
        };
        copy(template.to_path_buf(), artifact.path.clone()).await?;

        let mut perms = tokio::fs::metadata(&artifact.path).await?.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            tokio::fs::set_permissions(&artifact.path, perms).await?;
        }

        tracing::debug!(path = %artifact.path.display(), "Working artifact created");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the working copy. A file that is already gone counts as removed.
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Working artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for WorkingArtifact {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
