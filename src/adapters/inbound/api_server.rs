//! Observability API Server
//!
//! Read-mostly HTTP API exposing cache, router, alert and scaler state to
//! dashboards, plus a Prometheus scrape endpoint.

use crate::application::{CacheStore, MetricsCollector, RequestRouter};
use crate::infrastructure::{AutoScaler, ShutdownController};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Query string of the alert listing.
#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub resolved: bool,
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<CacheStore>,
    pub router: Arc<RequestRouter>,
    pub metrics: Arc<MetricsCollector>,
    pub scaler: Arc<AutoScaler>,
}

impl ApiState {
    pub fn new(
        cache: Arc<CacheStore>,
        router: Arc<RequestRouter>,
        metrics: Arc<MetricsCollector>,
        scaler: Arc<AutoScaler>,
    ) -> Self {
        Self {
            cache,
            router,
            metrics,
            scaler,
        }
    }
}

/// Build the API routes over the given state.
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/cache/stats", get(cache_stats_handler))
        .route("/api/v1/router/stats", get(router_stats_handler))
        .route("/api/v1/alerts", get(list_alerts_handler))
        .route("/api/v1/alerts/:id/resolve", post(resolve_alert_handler))
        .route("/api/v1/report", get(report_handler))
        .route("/api/v1/scaler", get(scaler_handler))
        .route("/metrics", get(prometheus_handler))
        .with_state(state)
}

/// API Server for the observability endpoints.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    /// Run the API server until the controller signals shutdown.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let app = api_router(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("observability API listening on {}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
            .await?;
        tracing::info!("observability API stopped");
        Ok(())
    }
}

// Handler functions

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn cache_stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.cache.stats())
}

async fn router_stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.router.stats())
}

async fn list_alerts_handler(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    Json(state.metrics.get_alerts(query.resolved))
}

async fn resolve_alert_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.metrics.resolve_alert(&id) {
        tracing::info!("alert {} resolved via API", id);
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": id,
                "resolved": true
            })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "id": id,
                "error": "alert not found"
            })),
        )
    }
}

async fn report_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.metrics.generate_report())
}

async fn scaler_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.scaler.stats())
}

async fn prometheus_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}
