//! Engine adapter that drives a bridge executable over stdin/stdout.
//!
//! The bridge is the only host-specific piece: it owns the engine's
//! native automation interface and speaks the [`protocol`](crate::protocol)
//! on its standard streams. One bridge process serves one session and
//! exits on `close`.
//!
//! A request whose future is dropped before the reply arrives (for
//! example by a calculation timeout) leaves the stream out of step; the
//! session then refuses further requests and [`close`] kills the process
//! instead of asking it to exit.
//!
//! [`close`]: EngineSession::close

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use valvesize_core::codec::{EngineValue, ParamKind};

use crate::protocol::{BridgeRequest, BridgeResponse};
use crate::session::{EngineConnector, EngineError, EngineSession, ExportKind};

/// How long a bridge gets to acknowledge `close` and exit before it is killed.
const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Connector that spawns one bridge process per session.
pub struct ProcessEngine {
    bridge_path: PathBuf,
    args: Vec<String>,
    close_grace: Duration,
    available: OnceLock<bool>,
}

impl ProcessEngine {
    /// `bridge_path` may be a bare program name, resolved against `PATH`.
    pub fn new(bridge_path: impl Into<PathBuf>) -> Self {
        Self {
            bridge_path: bridge_path.into(),
            args: Vec::new(),
            close_grace: DEFAULT_CLOSE_GRACE,
            available: OnceLock::new(),
        }
    }

    /// Extra arguments passed to the bridge before any protocol traffic.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn bridge_path(&self) -> &Path {
        &self.bridge_path
    }
}

/// Whether `bridge` names an existing file, searching `PATH` for bare names.
fn probe(bridge: &Path) -> bool {
    if bridge.is_absolute() || bridge.components().count() > 1 {
        return bridge.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(bridge).is_file()))
        .unwrap_or(false)
}

#[async_trait]
impl EngineConnector for ProcessEngine {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = probe(&self.bridge_path);
            tracing::info!(
                bridge = %self.bridge_path.display(),
                available,
                "Probed engine bridge",
            );
            available
        })
    }

    async fn open(&self, artifact: &Path) -> Result<Box<dyn EngineSession>, EngineError> {
        if !self.is_available() {
            return Err(EngineError::Unavailable(format!(
                "bridge '{}' not found",
                self.bridge_path.display()
            )));
        }

        let mut child = Command::new(&self.bridge_path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("Bridge stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("Bridge stdout not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        tracing::info!(pid = child.id(), artifact = %artifact.display(), "Engine bridge spawned");

        let mut session = ProcessSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            in_flight: false,
            closed: false,
            close_grace: self.close_grace,
        };

        if let Err(e) = session
            .call(BridgeRequest::Open {
                path: artifact.to_path_buf(),
            })
            .await
        {
            session.kill().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

/// Relay the bridge's diagnostics into the log.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "valvesize_engine::bridge", "{line}");
    }
}

/// A session backed by one bridge process.
pub struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Set while a request awaits its reply. Still set after a dropped
    /// request future, which marks the stream as out of step.
    in_flight: bool,
    closed: bool,
    close_grace: Duration,
}

impl ProcessSession {
    async fn call(&mut self, request: BridgeRequest) -> Result<Option<EngineValue>, EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        if self.in_flight {
            return Err(EngineError::Protocol(
                "A previous request was abandoned before its reply".into(),
            ));
        }

        let op = request.op();
        let line = request.to_line()?;
        let stdin = self.stdin.as_mut().ok_or(EngineError::Closed)?;

        self.in_flight = true;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let reply = self
            .stdout
            .next_line()
            .await?
            .ok_or_else(|| EngineError::Protocol(format!("Bridge exited during {op}")))?;
        self.in_flight = false;

        tracing::trace!(op, reply = %reply, "Bridge reply");
        BridgeResponse::parse(&reply)?.into_result(op)
    }

    /// Kill the bridge without ceremony.
    async fn kill(&mut self) {
        self.closed = true;
        self.stdin = None;
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "Failed to kill engine bridge");
        }
    }
}

#[async_trait]
impl EngineSession for ProcessSession {
    async fn set_parameter(&mut self, name: &str, value: &EngineValue) -> Result<(), EngineError> {
        self.call(BridgeRequest::Set {
            name: name.to_string(),
            value: value.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn get_parameter(
        &mut self,
        name: &str,
        kind: ParamKind,
    ) -> Result<EngineValue, EngineError> {
        self.call(BridgeRequest::Get {
            name: name.to_string(),
            kind,
        })
        .await?
        .ok_or_else(|| EngineError::Protocol(format!("Bridge returned no value for '{name}'")))
    }

    async fn calculate(&mut self) -> Result<(), EngineError> {
        self.call(BridgeRequest::Calculate).await.map(|_| ())
    }

    async fn save(&mut self) -> Result<(), EngineError> {
        self.call(BridgeRequest::Save).await.map(|_| ())
    }

    async fn export(&mut self, kind: ExportKind, path: &Path) -> Result<(), EngineError> {
        self.call(BridgeRequest::Export {
            format: kind,
            path: path.to_path_buf(),
        })
        .await
        .map(|_| ())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }

        let acknowledged = if self.in_flight {
            Err(EngineError::Protocol(
                "Session abandoned mid-request; killing bridge".into(),
            ))
        } else {
            match tokio::time::timeout(self.close_grace, self.call(BridgeRequest::Close)).await {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(EngineError::Protocol(
                    "Bridge did not acknowledge close in time".into(),
                )),
            }
        };

        self.closed = true;
        // Closing stdin lets a well-behaved bridge see EOF and exit.
        self.stdin = None;

        let exited = if acknowledged.is_ok() {
            tokio::time::timeout(self.close_grace, self.child.wait()).await.ok()
        } else {
            None
        };
        match exited {
            Some(Ok(status)) => tracing::debug!(%status, "Engine bridge exited"),
            _ => self.kill().await,
        }

        acknowledged
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
