//! HTTP API: sample ingestion, stats, device inspection, health and metrics

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    anomaly::DetectionMetrics,
    health::{components, ComponentStatus, HealthRegistry},
    ingest::{EnqueueOutcome, IngestQueue},
    observability::ServiceMetrics,
    store::TelemetryStore,
    Sample, WindowRegistry,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Records returned by the history endpoints when no limit is given
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub queue: IngestQueue,
    pub windows: Arc<WindowRegistry>,
    pub store: Arc<dyn TelemetryStore>,
    /// Set while the queue is turning samples away for lack of room
    queue_saturated: AtomicBool,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ServiceMetrics,
        queue: IngestQueue,
        windows: Arc<WindowRegistry>,
        store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            queue,
            windows,
            store,
            queue_saturated: AtomicBool::new(false),
        }
    }

    /// Move the ingest component between healthy and degraded as the queue
    /// fills up and frees again
    async fn track_queue_pressure(&self, outcome: EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Full => {
                if !self.queue_saturated.swap(true, Ordering::AcqRel) {
                    warn!(
                        capacity = self.queue.capacity(),
                        "Ingest queue full, dropping samples"
                    );
                    self.health_registry
                        .set_degraded(components::INGEST, "ingest queue full, dropping samples")
                        .await;
                }
            }
            EnqueueOutcome::Accepted => {
                if self.queue_saturated.swap(false, Ordering::AcqRel) {
                    info!("Ingest queue has room again");
                    self.health_registry.set_healthy(components::INGEST).await;
                }
            }
            EnqueueOutcome::Rejected | EnqueueOutcome::Closed => {}
        }
    }
}

/// Accept one JSON sample and hand it to the analyzer queue
///
/// A full or closed queue drops the sample silently; the caller still gets
/// `ok`.
async fn ingest(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let started = Instant::now();
    let response = match accept_sample(&state, &body) {
        Ok(outcome) => {
            state.track_queue_pressure(outcome).await;
            (StatusCode::OK, "ok\n").into_response()
        }
        Err(response) => response,
    };
    state
        .metrics
        .observe_handle_latency(started.elapsed().as_secs_f64());
    response
}

fn accept_sample(state: &AppState, body: &[u8]) -> Result<EnqueueOutcome, Response> {
    let sample: Sample = match serde_json::from_slice(body) {
        Ok(sample) => sample,
        Err(e) => {
            debug!(error = %e, "Rejecting unparseable sample");
            return Err((StatusCode::BAD_REQUEST, "bad payload\n").into_response());
        }
    };
    if let Err(e) = sample.validate() {
        debug!(error = %e, "Rejecting invalid sample");
        return Err((StatusCode::BAD_REQUEST, "bad payload\n").into_response());
    }

    state.metrics.record_received(sample.rps);

    let outcome = state.queue.offer(sample);
    if !outcome.is_accepted() {
        state.metrics.inc_dropped(outcome.as_str());
    }
    state.metrics.set_queue_depth(state.queue.len());

    Ok(outcome)
}

/// Coarse plain-text report of tracked devices and queue depth
async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = format!(
        "devices_tracked={}\nqueue_depth={}\nqueue_capacity={}\n",
        state.windows.len(),
        state.queue.len(),
        state.queue.capacity()
    );
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        body,
    )
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

impl HistoryParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

fn store_unavailable(device: &str, error: &dyn std::fmt::Display) -> Response {
    warn!(device = %device, error = %error, "Store read failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": error.to_string() })),
    )
        .into_response()
}

/// Most recent raw samples of a device, newest first
async fn device_history(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state.store.recent_samples(&device, params.limit()).await {
        Ok(samples) => Json(samples).into_response(),
        Err(e) => store_unavailable(&device, &e),
    }
}

/// Most recent anomalies of a device, newest first
async fn device_anomalies(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state.store.recent_anomalies(&device, params.limit()).await {
        Ok(anomalies) => Json(anomalies).into_response(),
        Err(e) => store_unavailable(&device, &e),
    }
}

/// Current rolling statistics of a device
async fn device_window(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
) -> Response {
    match state.windows.stats(&device) {
        Some(stats) => Json(stats).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("device {} is not tracked", device) })),
        )
            .into_response(),
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
///
/// Gauges that drift while the analyzer drains are refreshed before encoding.
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.set_queue_depth(state.queue.len());
    state.metrics.set_devices_tracked(state.windows.len());

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/stats", get(stats))
        .route("/devices/:device/history", get(device_history))
        .route("/devices/:device/anomalies", get(device_anomalies))
        .route("/devices/:device/window", get(device_window))
        .route("/health", get(healthz))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Starting API server");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
