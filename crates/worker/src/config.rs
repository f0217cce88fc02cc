use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use valvesize_pipeline::DriverConfig;

use crate::worker::DrainConfig;

/// Errors loading [`WorkerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which engine adapter the binary wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Drive the bridge executable.
    Process,
    /// In-process stand-in, for dry runs.
    Loopback,
}

impl FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(EngineMode::Process),
            "loopback" => Ok(EngineMode::Loopback),
            other => Err(format!("expected 'process' or 'loopback', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3100`).
    pub port: u16,
    pub engine_mode: EngineMode,
    /// Bridge executable; bare names are looked up on `PATH`.
    pub bridge_path: PathBuf,
    pub template_path: PathBuf,
    pub work_dir: PathBuf,
    pub results_dir: PathBuf,
    pub slot_timeout: Duration,
    pub calculation_timeout: Duration,
    /// Bound on every engine call other than `calculate`.
    pub call_timeout: Duration,
    pub idle_poll_interval: Duration,
    pub max_idle_polls: u32,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `DATABASE_URL`             | required                         |
    /// | `HOST`                     | `0.0.0.0`                        |
    /// | `PORT`                     | `3100`                           |
    /// | `ENGINE_MODE`              | `process`                        |
    /// | `ENGINE_BRIDGE_PATH`       | `valve-engine-bridge`            |
    /// | `ENGINE_TEMPLATE_PATH`     | `templates/sizing_template.vsz`  |
    /// | `ENGINE_WORK_DIR`          | `<temp dir>/valvesize-work`      |
    /// | `RESULTS_DIR`              | `results`                        |
    /// | `SLOT_WAIT_TIMEOUT_SECS`   | `60`                             |
    /// | `CALCULATION_TIMEOUT_SECS` | `30`                             |
    /// | `ENGINE_CALL_TIMEOUT_SECS` | `10`                             |
    /// | `IDLE_POLL_INTERVAL_MS`    | `100`                            |
    /// | `MAX_IDLE_POLLS`           | `20`                             |
    /// | `LOG_FORMAT`               | `text`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse(&var, "PORT", 3100)?;
        let engine_mode = parse(&var, "ENGINE_MODE", EngineMode::Process)?;
        let bridge_path = var("ENGINE_BRIDGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("valve-engine-bridge"));
        let template_path = var("ENGINE_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("templates/sizing_template.vsz"));
        let work_dir = var("ENGINE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("valvesize-work"));
        let results_dir = var("RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("results"));
        let slot_timeout = Duration::from_secs(parse(&var, "SLOT_WAIT_TIMEOUT_SECS", 60)?);
        let calculation_timeout = Duration::from_secs(parse(&var, "CALCULATION_TIMEOUT_SECS", 30)?);
        let call_timeout = Duration::from_secs(parse(&var, "ENGINE_CALL_TIMEOUT_SECS", 10)?);
        let idle_poll_interval = Duration::from_millis(parse(&var, "IDLE_POLL_INTERVAL_MS", 100)?);
        let max_idle_polls = parse(&var, "MAX_IDLE_POLLS", 20)?;
        let log_format = parse(&var, "LOG_FORMAT", LogFormat::Text)?;

        Ok(Self {
            database_url,
            host,
            port,
            engine_mode,
            bridge_path,
            template_path,
            work_dir,
            results_dir,
            slot_timeout,
            calculation_timeout,
            call_timeout,
            idle_poll_interval,
            max_idle_polls,
            log_format,
        })
    }

    pub fn driver_config(&self) -> DriverConfig {
        let mut config = DriverConfig::new(
            self.template_path.clone(),
            self.work_dir.clone(),
            self.results_dir.clone(),
        );
        config.slot_timeout = self.slot_timeout;
        config.calculation_timeout = self.calculation_timeout;
        config.call_timeout = self.call_timeout;
        config
    }

    pub fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            idle_poll_interval: self.idle_poll_interval,
            max_idle_polls: self.max_idle_polls,
        }
    }
}

fn parse<T>(
    var: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
