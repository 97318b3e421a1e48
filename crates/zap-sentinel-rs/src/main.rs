mod adapters;
mod api;
mod config;
mod db;
mod error;
mod jobs;
mod models;
mod orchestrator;
mod telemetry;

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    adapters::{ScanEngine, ZapAdapter},
    config::AppConfig,
    jobs::JobSupervisor,
    telemetry::{Collector, RemoteCollector},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub engine: Arc<dyn ScanEngine>,
    pub config: Arc<AppConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Arc::new(AppConfig::load()?);

    let pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        config.request_timeout(),
    )
    .await
    .context("failed to open result store")?;
    db::run_migrations(&pool).await?;

    let engine: Arc<dyn ScanEngine> = Arc::new(ZapAdapter::new(
        &config.zap_base_url,
        &config.zap_api_key,
        config.request_timeout(),
    )?);
    let collector: Arc<dyn Collector> = Arc::new(RemoteCollector::new(
        &config.collector_base_url,
        config.request_timeout(),
    )?);
    info!(engine = engine.name(), base_url = %config.zap_base_url, "scanning engine configured");

    let supervisor = JobSupervisor::new(engine.clone(), collector, config.clone());
    if !config.target_acquisition_enabled {
        supervisor.stop_target_acquisition();
    }
    supervisor.start().await;

    let state = AppState {
        pool: pool.clone(),
        engine,
        config: config.clone(),
    };
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "zap-sentinel-rs listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown().await;
    pool.close().await;
    info!("shutdown complete");
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/create_context", post(api::create_context))
        .route("/add_site", post(api::add_site))
        .route("/start_scan", post(api::start_scan))
        .route("/scan_status", get(api::scan_status))
        .route("/scan_results_db", get(api::scan_results_db))
        .route("/scan_results", get(api::scan_results))
        .route("/scan_results_all", get(api::scan_results_all))
        .route("/contexts", get(api::contexts))
        .route("/delete_context", delete(api::delete_context))
        .route(
            "/db_results",
            get(api::db_results).delete(api::delete_db_results),
        )
        .route("/active_scans_count", get(api::active_scans_count))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Resolves on Ctrl-C or SIGTERM. The SIGTERM handler is installed before the
/// returned future is first polled.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        info!("shutdown signal received");
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
