use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::alerts::{create_alert, delete_alert, get_alert, list_alerts, update_alert};
use super::stream::stream_alerts;
use crate::alerts::AlertStore;
use crate::errors::Result;
use crate::monitoring::{HealthCheck, HealthReport, NotifierMetrics};
use crate::relay::RelayStatus;
use crate::stream::FanoutRegistry;
use crate::utils::wait_for_shutdown;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AlertStore>,
    pub registry: Arc<FanoutRegistry>,
    pub metrics: Arc<NotifierMetrics>,
    pub health: Arc<HealthCheck>,
    /// Absent when this process has no relay subscriber.
    pub relay_status: Option<RelayStatus>,
    pub heartbeat_interval: Duration,
    pub shutdown: watch::Receiver<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alerts/stream", get(stream_alerts))
        .route("/alerts", get(list_alerts).post(create_alert))
        .route(
            "/alerts/:id",
            get(get_alert).put(update_alert).delete(delete_alert),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// HTTP front of the gateway role.
pub struct GatewayServer {
    bind_addr: String,
    state: AppState,
}

impl GatewayServer {
    pub fn new(bind_addr: impl Into<String>, state: AppState) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            state,
        }
    }

    /// Serve until shutdown; open streams end when the signal fires.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        let app = router(self.state);

        info!("Gateway listening on http://{}", self.bind_addr);
        info!("  - Stream: http://{}/alerts/stream", self.bind_addr);
        info!("  - Metrics: http://{}/metrics", self.bind_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let relay = state.relay_status.as_ref().map(RelayStatus::get);
    Json(state.health.report(state.registry.stats(), relay))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let body = state.metrics.encode()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
