//! In-process engine for dry runs and tests.
//!
//! A loopback session remembers every parameter it is given and hands it
//! back on `get`. Scripted outputs become readable after `calculate`.
//! `save` and `export` write real files so cleanup and results paths can
//! be checked on disk. Failures, panics and calculation delays can be
//! scripted per engine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use valvesize_core::codec::{EngineValue, ParamKind};

use crate::session::{EngineConnector, EngineError, EngineSession, ExportKind};

#[derive(Debug, Clone, Default)]
struct Script {
    outputs: HashMap<String, EngineValue>,
    unavailable: bool,
    fail_open: bool,
    fail_set: HashSet<String>,
    fail_get: HashSet<String>,
    fail_calculate: bool,
    panic_on_calculate: bool,
    fail_export: bool,
    calculate_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Stats {
    opened: AtomicUsize,
    open_now: AtomicUsize,
    max_concurrent: AtomicUsize,
    last_parameters: Mutex<BTreeMap<String, EngineValue>>,
    artifacts: Mutex<Vec<PathBuf>>,
}

impl Stats {
    fn session_closed(&self) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Connector producing [`LoopbackSession`]s. Configure with the builder
/// methods before sharing it.
#[derive(Debug, Default)]
pub struct LoopbackEngine {
    script: Arc<Script>,
    stats: Arc<Stats>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::make_mut(&mut self.script)
    }

    /// Serve `value` for `name` once a session has calculated.
    pub fn with_output(mut self, name: &str, value: EngineValue) -> Self {
        self.script_mut().outputs.insert(name.to_string(), value);
        self
    }

    /// Report the engine as not installed.
    pub fn unavailable(mut self) -> Self {
        self.script_mut().unavailable = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.script_mut().fail_open = true;
        self
    }

    pub fn fail_set(mut self, name: &str) -> Self {
        self.script_mut().fail_set.insert(name.to_string());
        self
    }

    pub fn fail_get(mut self, name: &str) -> Self {
        self.script_mut().fail_get.insert(name.to_string());
        self
    }

    pub fn fail_calculate(mut self) -> Self {
        self.script_mut().fail_calculate = true;
        self
    }

    /// Panic inside `calculate`, for exercising task isolation.
    pub fn panic_on_calculate(mut self) -> Self {
        self.script_mut().panic_on_calculate = true;
        self
    }

    pub fn fail_export(mut self) -> Self {
        self.script_mut().fail_export = true;
        self
    }

    pub fn calculate_delay(mut self, delay: Duration) -> Self {
        self.script_mut().calculate_delay = Some(delay);
        self
    }

    // -- inspection -----------------------------------------------------------

    /// Sessions opened over the engine's lifetime.
    pub fn sessions_opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.stats.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of sessions ever open at once.
    pub fn max_concurrent_sessions(&self) -> usize {
        self.stats.max_concurrent.load(Ordering::SeqCst)
    }

    /// Parameters set on the most recently opened session.
    pub fn last_parameters(&self) -> BTreeMap<String, EngineValue> {
        lock(&self.stats.last_parameters).clone()
    }

    /// Working files sessions were opened on, in order.
    pub fn opened_artifacts(&self) -> Vec<PathBuf> {
        lock(&self.stats.artifacts).clone()
    }
}

#[async_trait]
impl EngineConnector for LoopbackEngine {
    fn is_available(&self) -> bool {
        !self.script.unavailable
    }

    async fn open(&self, artifact: &Path) -> Result<Box<dyn EngineSession>, EngineError> {
        if self.script.unavailable {
            return Err(EngineError::Unavailable("loopback engine disabled".into()));
        }
        if self.script.fail_open {
            return Err(EngineError::Rejected {
                op: "open",
                message: "scripted open failure".into(),
            });
        }
        if !tokio::fs::try_exists(artifact).await? {
            return Err(EngineError::Rejected {
                op: "open",
                message: format!("no such file '{}'", artifact.display()),
            });
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_concurrent.fetch_max(now, Ordering::SeqCst);
        lock(&self.stats.artifacts).push(artifact.to_path_buf());
        lock(&self.stats.last_parameters).clear();

        tracing::debug!(artifact = %artifact.display(), "Loopback session opened");

        Ok(Box::new(LoopbackSession {
            artifact: artifact.to_path_buf(),
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            params: BTreeMap::new(),
            calculated: false,
            closed: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct LoopbackSession {
    artifact: PathBuf,
    script: Arc<Script>,
    stats: Arc<Stats>,
    params: BTreeMap<String, EngineValue>,
    calculated: bool,
    closed: bool,
}

impl LoopbackSession {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn outputs(&self) -> BTreeMap<&str, &EngineValue> {
        if !self.calculated {
            return BTreeMap::new();
        }
        self.script
            .outputs
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    fn snapshot_json(&self) -> Result<String, EngineError> {
        let doc = serde_json::json!({
            "artifact": self.artifact.display().to_string(),
            "calculated": self.calculated,
            "inputs": self.params,
            "outputs": self.outputs(),
        });
        serde_json::to_string_pretty(&doc)
            .map_err(|e| EngineError::Protocol(format!("Failed to encode snapshot: {e}")))
    }

    fn report_html(&self) -> String {
        let mut rows = String::new();
        for (name, value) in &self.params {
            rows.push_str(&format!("<tr><td>{name}</td><td>{}</td></tr>\n", display(value)));
        }
        for (name, value) in self.outputs() {
            rows.push_str(&format!("<tr><th>{name}</th><td>{}</td></tr>\n", display(value)));
        }
        format!("<html><body><h1>Sizing report</h1>\n<table>\n{rows}</table></body></html>\n")
    }
}

fn display(value: &EngineValue) -> String {
    match value {
        EngineValue::Flag(b) => b.to_string(),
        EngineValue::Number(x) => x.to_string(),
        EngineValue::Unit(s) | EngineValue::Text(s) => s.clone(),
    }
}

#[async_trait]
impl EngineSession for LoopbackSession {
    async fn set_parameter(&mut self, name: &str, value: &EngineValue) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.script.fail_set.contains(name) {
            return Err(EngineError::Rejected {
                op: "set",
                message: format!("scripted failure for '{name}'"),
            });
        }
        self.params.insert(name.to_string(), value.clone());
        lock(&self.stats.last_parameters).insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn get_parameter(
        &mut self,
        name: &str,
        _kind: ParamKind,
    ) -> Result<EngineValue, EngineError> {
        self.ensure_open()?;
        if self.script.fail_get.contains(name) {
            return Err(EngineError::Rejected {
                op: "get",
                message: format!("scripted failure for '{name}'"),
            });
        }
        if self.calculated {
            if let Some(value) = self.script.outputs.get(name) {
                return Ok(value.clone());
            }
        }
        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Rejected {
                op: "get",
                message: format!("no value for '{name}'"),
            })
    }

    async fn calculate(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        if let Some(delay) = self.script.calculate_delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.panic_on_calculate {
            panic!("scripted calculation panic");
        }
        if self.script.fail_calculate {
            return Err(EngineError::Rejected {
                op: "calculate",
                message: "scripted calculation failure".into(),
            });
        }
        self.calculated = true;
        Ok(())
    }

    async fn save(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        let body = serde_json::to_vec_pretty(&self.params)
            .map_err(|e| EngineError::Protocol(format!("Failed to encode parameters: {e}")))?;
        tokio::fs::write(&self.artifact, body).await?;
        Ok(())
    }

    async fn export(&mut self, kind: ExportKind, path: &Path) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.script.fail_export {
            return Err(EngineError::Rejected {
                op: "export",
                message: format!("scripted {kind} export failure"),
            });
        }
        let body = match kind {
            ExportKind::Snapshot => self.snapshot_json()?,
            ExportKind::Report => self.report_html(),
        };
        tokio::fs::write(path, body).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if !self.closed {
            self.closed = true;
            self.stats.session_closed();
            tracing::debug!(artifact = %self.artifact.display(), "Loopback session closed");
        }
        Ok(())
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        if !self.closed {
            self.stats.session_closed();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    async fn artifact(dir: &Path) -> PathBuf {
        let path = dir.join("work.vsz");
        tokio::fs::write(&path, b"template").await.unwrap();
        path
    }

    #[tokio::test]
    async fn echoes_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new();
        let mut session = engine.open(&artifact(dir.path()).await).await.unwrap();

        session
            .set_parameter("Inlet Temperature", &EngineValue::Number(120.0))
            .await
            .unwrap();
        assert_eq!(
            session.get_parameter("Inlet Temperature", ParamKind::Number).await.unwrap(),
            EngineValue::Number(120.0)
        );
        assert_eq!(
            engine.last_parameters().get("Inlet Temperature"),
            Some(&EngineValue::Number(120.0))
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn outputs_appear_only_after_calculate() {
        let dir = tempfile::tempdir().unwrap();
        let engine =
            LoopbackEngine::new().with_output("Calculated Cv Max", EngineValue::Number(41.7));
        let mut session = engine.open(&artifact(dir.path()).await).await.unwrap();

        assert!(session.get_parameter("Calculated Cv Max", ParamKind::Number).await.is_err());
        session.calculate().await.unwrap();
        assert_eq!(
            session.get_parameter("Calculated Cv Max", ParamKind::Number).await.unwrap(),
            EngineValue::Number(41.7)
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn scripted_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(dir.path()).await;

        let engine = LoopbackEngine::new().fail_set("Valve Type").fail_calculate();
        let mut session = engine.open(&path).await.unwrap();
        assert_matches!(
            session.set_parameter("Valve Type", &EngineValue::Text("x".into())).await,
            Err(EngineError::Rejected { op: "set", .. })
        );
        assert_matches!(
            session.calculate().await,
            Err(EngineError::Rejected { op: "calculate", .. })
        );
        session.close().await.unwrap();

        let engine = LoopbackEngine::new().fail_open();
        assert!(engine.open(&path).await.is_err());
        assert_eq!(engine.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn open_requires_existing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new();
        assert!(engine.open(&dir.path().join("missing.vsz")).await.is_err());
    }

    #[tokio::test]
    async fn tracks_open_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(dir.path()).await;
        let engine = LoopbackEngine::new();

        let mut a = engine.open(&path).await.unwrap();
        let b = engine.open(&path).await.unwrap();
        assert_eq!(engine.open_sessions(), 2);

        a.close().await.unwrap();
        a.close().await.unwrap();
        drop(b);
        assert_eq!(engine.open_sessions(), 0);
        assert_eq!(engine.max_concurrent_sessions(), 2);
        assert_eq!(engine.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn save_and_export_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(dir.path()).await;
        let engine = LoopbackEngine::new();
        let mut session = engine.open(&path).await.unwrap();

        session
            .set_parameter("Fluid Name", &EngineValue::Text("Water".into()))
            .await
            .unwrap();
        session.calculate().await.unwrap();
        session.save().await.unwrap();

        let snapshot = dir.path().join("R_1.snapshot.json");
        let report = dir.path().join("R_1.report.html");
        session.export(ExportKind::Snapshot, &snapshot).await.unwrap();
        session.export(ExportKind::Report, &report).await.unwrap();
        session.close().await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(saved["Fluid Name"]["value"], "Water");

        let snap: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&snapshot).await.unwrap()).unwrap();
        assert_eq!(snap["calculated"], true);
        assert!(tokio::fs::read_to_string(&report).await.unwrap().contains("Water"));
    }

    #[tokio::test]
    async fn closed_session_refuses_calls() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new();
        let mut session = engine.open(&artifact(dir.path()).await).await.unwrap();
        session.close().await.unwrap();
        assert_matches!(session.calculate().await, Err(EngineError::Closed));
    }

    #[test]
    fn unavailable_engine() {
        assert!(LoopbackEngine::new().is_available());
        assert!(!LoopbackEngine::new().unavailable().is_available());
    }
}
