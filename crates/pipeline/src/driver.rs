//! Runs one work item against the engine.
//!
//! Order of operations for a key:
//!
//! 1. wait (bounded) for the single engine slot
//! 2. copy the template to a private working file
//! 3. open a session on it
//! 4. load the request row, encode it, push every parameter
//! 5. calculate, save, export snapshot and report
//! 6. read the selected outputs back
//! 7. upsert the result row
//! 8. close the session and delete the working file
//! 9. release the slot
//!
//! Steps 3 to 7 may fail the item; step 8 runs regardless. A slot timeout
//! fails before anything is created. Every engine call is bounded:
//! `calculate` by `calculation_timeout`, every other call by `call_timeout`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use valvesize_core::codec::{self, Modes, ResultSet};
use valvesize_core::work_key::WorkKey;
use valvesize_db::store::RowStore;
use valvesize_engine::artifact::WorkingArtifact;
use valvesize_engine::session::{EngineConnector, EngineError, EngineSession, ExportKind};

use crate::error::JobError;
use crate::exports::ArtifactPaths;

/// Default bound on waiting for the engine slot.
pub const DEFAULT_SLOT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on a single calculation.
pub const DEFAULT_CALCULATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on every other engine call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// File locations and time bounds for the driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Read-only template every working file is copied from.
    pub template_path: PathBuf,
    /// Where private working files are created.
    pub work_dir: PathBuf,
    /// Root of the per-request export directories.
    pub results_dir: PathBuf,
    pub slot_timeout: Duration,
    pub calculation_timeout: Duration,
    /// Bound on open, set, get, save, export and close.
    pub call_timeout: Duration,
}

impl DriverConfig {
    pub fn new(
        template_path: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            template_path: template_path.into(),
            work_dir: work_dir.into(),
            results_dir: results_dir.into(),
            slot_timeout: DEFAULT_SLOT_TIMEOUT,
            calculation_timeout: DEFAULT_CALCULATION_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub key: WorkKey,
    /// Parameters the engine accepted.
    pub parameters_pushed: usize,
    /// Parameters the engine refused (non-fatal).
    pub parameters_rejected: usize,
    /// Columns written to the result row.
    pub results_stored: usize,
    /// Exports that were written.
    pub exports_written: usize,
}

/// Drives engine sessions, one at a time.
///
/// The slot is a capacity-1 semaphore. Drivers built with
/// [`with_gate`](Self::with_gate) on the same semaphore share the slot.
pub struct SessionDriver {
    connector: Arc<dyn EngineConnector>,
    store: Arc<dyn RowStore>,
    gate: Arc<Semaphore>,
    config: DriverConfig,
}

impl SessionDriver {
    pub fn new(
        connector: Arc<dyn EngineConnector>,
        store: Arc<dyn RowStore>,
        config: DriverConfig,
    ) -> Self {
        Self {
            connector,
            store,
            gate: Arc::new(Semaphore::new(1)),
            config,
        }
    }

    /// Use an existing slot gate instead of a private one.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &Arc<Semaphore> {
        &self.gate
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    /// Run one work item to completion.
    pub async fn run(&self, key: &WorkKey) -> Result<JobOutcome, JobError> {
        let _permit = self.acquire_slot(key).await?;

        let artifact =
            WorkingArtifact::materialize(&self.config.template_path, &self.config.work_dir)
                .await
                .map_err(JobError::Artifact)?;

        let bound = self.config.call_timeout;
        let opened = bounded("open", bound, self.connector.open(artifact.path())).await;
        let mut session = match opened {
            Ok(session) => session,
            Err(source) => {
                discard(artifact).await;
                return Err(JobError::Engine {
                    stage: "open",
                    source,
                });
            }
        };
        tracing::info!(
            work_key = %key,
            artifact = %artifact.path().display(),
            "Engine session opened",
        );

        let result = self.drive(key, session.as_mut()).await;

        if let Err(e) = bounded("close", bound, session.close()).await {
            tracing::warn!(work_key = %key, error = %e, "Engine session did not close cleanly");
        }
        drop(session);
        discard(artifact).await;
        tracing::info!(work_key = %key, "Engine session closed");

        result
    }

    /// Wait for the slot, at most `slot_timeout`.
    async fn acquire_slot(&self, key: &WorkKey) -> Result<OwnedSemaphorePermit, JobError> {
        let wait = self.config.slot_timeout;
        match tokio::time::timeout(wait, Arc::clone(&self.gate).acquire_owned()).await {
            Ok(Ok(permit)) => {
                tracing::debug!(work_key = %key, "Engine slot acquired");
                Ok(permit)
            }
            Ok(Err(_)) => Err(JobError::GateClosed),
            Err(_) => Err(JobError::AdmissionTimeout(wait)),
        }
    }

    /// Steps 4 to 7, against an open session.
    async fn drive(
        &self,
        key: &WorkKey,
        session: &mut dyn EngineSession,
    ) -> Result<JobOutcome, JobError> {
        let row = self.store.fetch_row(key).await?;
        if row.is_empty() {
            tracing::warn!(work_key = %key, "No request fields found, engine defaults apply");
        }

        let bound = self.config.call_timeout;
        let params = codec::encode(&row);
        let mut rejected = 0;
        for param in params.iter() {
            match bounded("set", bound, session.set_parameter(param.name, &param.value)).await {
                Ok(()) => tracing::trace!(work_key = %key, parameter = param.name, "Parameter set"),
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(
                        work_key = %key,
                        parameter = param.name,
                        error = %e,
                        "Engine rejected parameter",
                    );
                }
            }
        }
        tracing::debug!(
            work_key = %key,
            pushed = params.len() - rejected,
            rejected,
            gas_phase = params.modes.gas_phase,
            field_list = codec::FIELD_LIST_VERSION,
            "Parameters pushed",
        );

        let calculation_bound = self.config.calculation_timeout;
        match tokio::time::timeout(calculation_bound, session.calculate()).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(JobError::Engine {
                    stage: "calculate",
                    source,
                })
            }
            Err(_) => return Err(JobError::CalculationTimeout(calculation_bound)),
        }

        bounded("save", bound, session.save())
            .await
            .map_err(|source| JobError::Engine {
                stage: "save",
                source,
            })?;

        let exports_written = self.export(key, session).await;
        let results = read_results(key, &params.modes, bound, session).await;

        self.store.upsert_result(key, &results).await?;
        tracing::debug!(work_key = %key, columns = results.len(), "Result row stored");

        Ok(JobOutcome {
            key: key.clone(),
            parameters_pushed: params.len() - rejected,
            parameters_rejected: rejected,
            results_stored: results.len(),
            exports_written,
        })
    }

    /// Write the snapshot and report. Failures are logged, never fatal.
    async fn export(&self, key: &WorkKey, session: &mut dyn EngineSession) -> usize {
        let Some(paths) = ArtifactPaths::for_job(&self.config.results_dir, key) else {
            tracing::warn!(
                work_key = %key,
                "Request id is not a valid directory name, exports skipped",
            );
            return 0;
        };
        if let Err(e) = tokio::fs::create_dir_all(paths.dir()).await {
            tracing::warn!(
                work_key = %key,
                dir = %paths.dir().display(),
                error = %e,
                "Failed to create results directory, exports skipped",
            );
            return 0;
        }

        let mut written = 0;
        for kind in ExportKind::ALL {
            let path = paths.path(kind);
            match bounded("export", self.config.call_timeout, session.export(kind, path)).await {
                Ok(()) => {
                    written += 1;
                    tracing::debug!(
                        work_key = %key,
                        %kind,
                        path = %path.display(),
                        "Export written",
                    );
                }
                Err(e) => tracing::warn!(work_key = %key, %kind, error = %e, "Export failed"),
            }
        }
        written
    }
}

/// Read every output the modes select. Unreadable values are skipped.
async fn read_results(
    key: &WorkKey,
    modes: &Modes,
    bound: Duration,
    session: &mut dyn EngineSession,
) -> ResultSet {
    let mut results = ResultSet::default();
    for field in codec::result_fields(modes) {
        match bounded("get", bound, session.get_parameter(field.engine_name, field.kind)).await {
            Ok(raw) => match codec::decode(field.engine_name, field.kind, &raw) {
                Some((column, value)) => results.insert(column, value),
                None => tracing::warn!(
                    work_key = %key,
                    parameter = field.engine_name,
                    "Output value could not be decoded",
                ),
            },
            Err(e) => tracing::warn!(
                work_key = %key,
                parameter = field.engine_name,
                error = %e,
                "Output not readable",
            ),
        }
    }
    results
}

/// Run one engine call, failing with [`EngineError::Timeout`] past `after`.
async fn bounded<T>(
    op: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    tokio::time::timeout(after, call)
        .await
        .unwrap_or(Err(EngineError::Timeout { op, after }))
}

async fn discard(artifact: WorkingArtifact) {
    let path = artifact.path().to_path_buf();
    if let Err(e) = artifact.remove().await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to delete working artifact");
    }
}
