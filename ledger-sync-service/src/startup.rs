//! Application startup and lifecycle management.

use crate::config::{LedgerSyncConfig, SalesReportSettings};
use crate::services::{get_metrics, init_metrics, Database, PaypalClient, PgRowStore, PgWatermarkStore};
use crate::sync::{sales_report, Clock, SyncOrchestrator, SystemClock, TransactionSource, WatermarkStore};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub source: Arc<dyn TransactionSource>,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub clock: Arc<dyn Clock>,
    pub report: SalesReportSettings,
    /// Absent when running against in-memory stores.
    pub db: Option<Arc<Database>>,
}

impl AppState {
    /// Connect to PostgreSQL and PayPal and wire the orchestrator.
    pub async fn connect(config: &LedgerSyncConfig, run_migrations: bool) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let source: Arc<dyn TransactionSource> = Arc::new(PaypalClient::new(config.paypal.clone())?);
        let watermarks: Arc<dyn WatermarkStore> = Arc::new(PgWatermarkStore::new(
            db.pool().clone(),
            config.sync.initial_date,
        ));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.sync.report_offset()?));
        let orchestrator = SyncOrchestrator::new(
            source.clone(),
            Arc::new(PgRowStore::new(db.pool().clone())),
            watermarks.clone(),
            clock.clone(),
            &config.sync,
        )?;

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            source,
            watermarks,
            clock,
            report: config.sync.report.clone(),
            db: Some(Arc::new(db)),
        })
    }
}

/// Run one sync and answer with its summary.
async fn update(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let outcome = state.orchestrator.run_once().await?;
    Ok((StatusCode::OK, outcome.to_string()))
}

/// Previous month's sales of the configured subject.
async fn sales(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = sales_report(
        state.source.as_ref(),
        state.clock.as_ref(),
        &state.report.subject,
        &state.report.currency,
    )
    .await?;
    Ok(Json(json!({
        "report": summary.to_string(),
        "summary": summary,
    })))
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match &state.db {
        Some(db) => db.health_check().await,
        None => Ok(()),
    };
    match db_status {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "ledger-sync-service",
                    "version": env!("CARGO_PKG_VERSION"),
                    "sync_running": state.orchestrator.is_running()
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "ledger-sync-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let Some(db) = &state.db else {
        return StatusCode::OK;
    };
    match db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> Result<impl IntoResponse, AppError> {
    let metrics = get_metrics()?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    ))
}

/// HTTP surface: sync trigger, sales report and probes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/update", get(update))
        .route("/report/sales", get(sales))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: LedgerSyncConfig) -> Result<Self, AppError> {
        init_metrics();
        let state = AppState::connect(&config, true).await?;
        Self::with_state(state, config.common.port).await
    }

    /// Bind a listener for an already wired state. Port 0 picks a free port.
    pub async fn with_state(state: AppState, port: u16) -> Result<Self, AppError> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Ledger sync service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = "ledger-sync-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router(self.state))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
