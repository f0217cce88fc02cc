//! Shared fixtures for worker and HTTP integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use valvesize_core::codec::{EngineValue, SparseRow, StoredValue};
use valvesize_db::memory::MemoryRowStore;
use valvesize_engine::loopback::LoopbackEngine;
use valvesize_pipeline::{DriverConfig, SessionDriver};
use valvesize_worker::api::{build_router, AppState};
use valvesize_worker::drain::DrainReport;
use valvesize_worker::events::EventBus;
use valvesize_worker::queue::JobQueue;
use valvesize_worker::worker::{DrainConfig, SizingWorker};

pub struct Fixture {
    pub dir: TempDir,
    pub engine: Arc<LoopbackEngine>,
    pub store: Arc<MemoryRowStore>,
    pub events: Arc<EventBus>,
    pub worker: Arc<SizingWorker>,
}

impl Fixture {
    pub fn new(engine: LoopbackEngine) -> Self {
        Self::with_config(engine, |_| {})
    }

    /// Fast timeouts and a short idle backoff; `tweak` may adjust them.
    pub fn with_config(engine: LoopbackEngine, tweak: impl FnOnce(&mut DriverConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("sizing_template.vsz");
        std::fs::write(&template, b"template").unwrap();

        let mut config = DriverConfig::new(
            template,
            dir.path().join("work"),
            dir.path().join("results"),
        );
        config.slot_timeout = Duration::from_millis(200);
        config.calculation_timeout = Duration::from_secs(2);
        tweak(&mut config);

        let engine = Arc::new(engine);
        let store = Arc::new(MemoryRowStore::new());
        let events = Arc::new(EventBus::default());
        let driver = Arc::new(SessionDriver::new(engine.clone(), store.clone(), config));
        let worker = Arc::new(SizingWorker::new(
            Arc::new(JobQueue::new()),
            driver,
            Arc::clone(&events),
            DrainConfig {
                idle_poll_interval: Duration::from_millis(10),
                max_idle_polls: 3,
            },
        ));

        Self {
            dir,
            engine,
            store,
            events,
            worker,
        }
    }

    pub fn app(&self) -> Router {
        build_router(AppState {
            worker: Arc::clone(&self.worker),
        })
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn residual_files(&self) -> usize {
        std::fs::read_dir(self.work_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Wait until a drain has finished and none is running.
    pub async fn wait_for_drain(&self) -> DrainReport {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if !self.worker.is_processing() {
                    if let Some(report) = self.worker.last_report() {
                        return report;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("drain did not finish in time")
    }
}

pub fn liquid_request() -> SparseRow {
    [
        ("valve_type", StoredValue::Text("BV".into())),
        ("fluid_phase", StoredValue::Text("L".into())),
        ("inlet_temperature", StoredValue::Decimal(20.0)),
        ("inlet_temperature_unit", StoredValue::Text("degC".into())),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn engine_with_outputs() -> LoopbackEngine {
    LoopbackEngine::new()
        .with_output("Calculated Cv Max", EngineValue::Number(41.7))
        .with_output("Calculated Mass Flow Max", EngineValue::Number(79.4))
}

// -- HTTP helpers -------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
