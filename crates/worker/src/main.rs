use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use valvesize_db::store::PgRowStore;
use valvesize_engine::loopback::LoopbackEngine;
use valvesize_engine::process::ProcessEngine;
use valvesize_engine::session::EngineConnector;
use valvesize_pipeline::SessionDriver;
use valvesize_worker::api::{self, AppState};
use valvesize_worker::config::{EngineMode, LogFormat, WorkerConfig};
use valvesize_worker::events::{EventBus, JobEvent};
use valvesize_worker::queue::JobQueue;
use valvesize_worker::worker::SizingWorker;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(
        host = %config.host,
        port = config.port,
        engine_mode = ?config.engine_mode,
        field_list = valvesize_core::codec::FIELD_LIST_VERSION,
        "Loaded worker configuration",
    );

    // --- Engine ---
    let connector: Arc<dyn EngineConnector> = match config.engine_mode {
        EngineMode::Process => Arc::new(ProcessEngine::new(config.bridge_path.clone())),
        EngineMode::Loopback => Arc::new(LoopbackEngine::new()),
    };
    if !connector.is_available() {
        tracing::error!(
            bridge = %config.bridge_path.display(),
            "Calculation engine is not available on this host",
        );
        std::process::exit(1);
    }
    tracing::info!("Calculation engine available");

    // --- Database ---
    let pool = valvesize_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    valvesize_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    valvesize_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgRowStore::new(pool));

    // --- Worker ---
    let events = Arc::new(EventBus::default());
    let event_log_handle = tokio::spawn(log_events(events.subscribe()));

    let driver = Arc::new(SessionDriver::new(connector, store, config.driver_config()));
    let worker = Arc::new(SizingWorker::new(
        Arc::new(JobQueue::new()),
        driver,
        Arc::clone(&events),
        config.drain_config(),
    ));

    // --- Router ---
    let app = api::build_router(AppState {
        worker: Arc::clone(&worker),
    });

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown_worker = Arc::clone(&worker);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_worker.shutdown();
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        queue_depth = worker.queue().depth(),
        is_processing = worker.is_processing(),
        "Server stopped accepting connections",
    );

    // The item in flight finishes or hits its own timeout.
    let grace = config.calculation_timeout + Duration::from_secs(5);
    let settled = tokio::time::timeout(grace, async {
        while worker.is_processing() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if settled.is_err() {
        tracing::warn!("Drain still running at exit");
    }

    drop(worker);
    drop(events);
    event_log_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "valvesize_worker=debug,valvesize_pipeline=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Mirror worker events into the log at debug level.
async fn log_events(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(event = %json, "Job event"),
                Err(e) => tracing::warn!(error = %e, "Failed to encode job event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Job event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
