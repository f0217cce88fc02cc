//! Shared fixtures for driver integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use valvesize_core::codec::{EngineValue, SparseRow, StoredValue};
use valvesize_core::work_key::WorkKey;
use valvesize_db::memory::MemoryRowStore;
use valvesize_engine::loopback::LoopbackEngine;
use valvesize_pipeline::{DriverConfig, SessionDriver};

/// A driver wired to a loopback engine and an in-memory store inside a
/// temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub engine: Arc<LoopbackEngine>,
    pub store: Arc<MemoryRowStore>,
    pub driver: SessionDriver,
}

impl Fixture {
    pub fn new(engine: LoopbackEngine) -> Self {
        Self::with_config(engine, |_| {})
    }

    /// Build with fast timeouts, then let `tweak` adjust the config.
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
        config.calculation_timeout = Duration::from_millis(500);
        tweak(&mut config);

        let engine = Arc::new(engine);
        let store = Arc::new(MemoryRowStore::new());
        let driver = SessionDriver::new(engine.clone(), store.clone(), config);

        Self {
            dir,
            engine,
            store,
            driver,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// Files left behind in the working directory.
    pub fn residual_files(&self) -> usize {
        count_files(&self.work_dir())
    }
}

pub fn count_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

pub fn key(token: &str) -> WorkKey {
    WorkKey::parse(token).unwrap()
}

pub fn text(s: &str) -> StoredValue {
    StoredValue::Text(s.to_string())
}

pub fn num(x: f64) -> StoredValue {
    StoredValue::Decimal(x)
}

pub fn row(pairs: &[(&str, StoredValue)]) -> SparseRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A liquid request on volumetric flow and pressure drop.
pub fn liquid_request() -> SparseRow {
    row(&[
        ("valve_type", text("GL")),
        ("fluid_phase", text("L")),
        ("nominal_size", text("080")),
        ("pressure_class", text("300")),
        ("fluid_name", text("Water")),
        ("flow_is_mass", StoredValue::Flag(false)),
        ("pressure_is_gauge", StoredValue::Flag(false)),
        ("uses_density", StoredValue::Flag(true)),
        ("inlet_temperature", num(40.0)),
        ("inlet_temperature_unit", text("degC")),
        ("inlet_pressure_max", num(12.0)),
        ("inlet_pressure_unit", text("bar(g)")),
        ("volume_flow_max", num(80.0)),
        ("volume_flow_unit", text("m3/h")),
        ("pressure_drop_max", num(2.5)),
        ("pressure_drop_unit", text("bar")),
        ("density", num(992.0)),
        ("density_unit", text("kg/m3")),
    ])
}

/// An engine that answers every output, both phase groups included.
pub fn engine_with_outputs() -> LoopbackEngine {
    LoopbackEngine::new()
        .with_output("Calculated Cv Max", EngineValue::Number(41.7))
        .with_output("Calculated Cv Normal", EngineValue::Number(30.2))
        .with_output("Valve Opening Max", EngineValue::Number(78.0))
        .with_output("Choked Flow", EngineValue::Flag(false))
        .with_output("Predicted Noise Unit", EngineValue::Unit("dBA".into()))
        .with_output("Standard Volumetric Flow Max", EngineValue::Number(1500.0))
        .with_output("Standard Volumetric Flow Unit", EngineValue::Unit("Nm3/h".into()))
        .with_output("Calculated Mass Flow Max", EngineValue::Number(79.4))
        .with_output("Calculated Mass Flow Unit", EngineValue::Unit("t/h".into()))
}
