//! Integration tests for the service API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use sentinel::{create_router, AppState};
use sentinel_lib::{
    anomaly::{Analyzer, AnalyzerLoop, NoopMetrics, WindowRegistry},
    health::{components, HealthRegistry},
    ingest::{IngestQueue, QueueConsumer},
    observability::{ServiceMetrics, StructuredLogger},
    store::MemoryStore,
    Sample,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
    windows: Arc<WindowRegistry>,
}

async fn setup_test_app(queue_capacity: usize) -> (TestApp, QueueConsumer) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all(&components::ALL).await;

    let store = Arc::new(MemoryStore::default());
    let windows = Arc::new(WindowRegistry::default());
    let (queue, consumer) = IngestQueue::bounded(queue_capacity);

    let state = Arc::new(AppState::new(
        health_registry,
        ServiceMetrics::new(),
        queue,
        windows.clone(),
        store.clone(),
    ));
    let router = create_router(state.clone());

    let app = TestApp {
        router,
        state,
        store,
        windows,
    };
    (app, consumer)
}

fn ingest_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn sample_json(device: &str, timestamp: i64, rps: i64) -> String {
    format!(
        r#"{{"device":"{}","timestamp":{},"cpu":37.5,"rps":{}}}"#,
        device, timestamp, rps
    )
}

#[tokio::test]
async fn test_ingest_accepts_valid_sample() {
    let (app, mut consumer) = setup_test_app(16).await;

    let response = app
        .router
        .oneshot(ingest_request(&sample_json("device-1", 1700000000, 120)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok\n");

    let queued = consumer.try_dequeue().unwrap();
    assert_eq!(queued, Sample::new("device-1", 1700000000, 37.5, 120));
}

#[tokio::test]
async fn test_ingest_rejects_malformed_body() {
    let (app, mut consumer) = setup_test_app(16).await;

    let response = app
        .router
        .oneshot(ingest_request(r#"{"device": 12, "rps": "many"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "bad payload\n");
    assert!(consumer.try_dequeue().is_none());
}

#[tokio::test]
async fn test_ingest_rejects_invalid_sample() {
    let (app, mut consumer) = setup_test_app(16).await;

    let response = app
        .router
        .oneshot(ingest_request(&sample_json("", 1, 10)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(consumer.try_dequeue().is_none());
}

#[tokio::test]
async fn test_ingest_rejects_oversized_rps() {
    let (app, mut consumer) = setup_test_app(16).await;

    let response = app
        .router
        .oneshot(ingest_request(&sample_json("device-1", 1, 1_000_000_000_000)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(consumer.try_dequeue().is_none());
}

#[tokio::test]
async fn test_full_queue_degrades_ingest_until_room_returns() {
    let (app, mut consumer) = setup_test_app(1).await;

    for ts in 0..2 {
        app.router
            .clone()
            .oneshot(ingest_request(&sample_json("device-1", ts, 100)))
            .await
            .unwrap();
    }

    let response = app
        .router
        .clone()
        .oneshot(get_request("/healthz"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"][components::INGEST]["status"], "degraded");

    assert!(consumer.try_dequeue().is_some());
    app.router
        .clone()
        .oneshot(ingest_request(&sample_json("device-1", 2, 100)))
        .await
        .unwrap();

    let response = app.router.oneshot(get_request("/healthz")).await.unwrap();
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"][components::INGEST]["status"], "healthy");
}

#[tokio::test]
async fn test_ingest_rejects_get() {
    let (app, _consumer) = setup_test_app(16).await;

    let response = app.router.oneshot(get_request("/ingest")).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_ingest_drops_silently_when_queue_full() {
    let (app, mut consumer) = setup_test_app(2).await;

    for ts in 0..5 {
        let response = app
            .router
            .clone()
            .oneshot(ingest_request(&sample_json("device-1", ts, 100)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.state.queue.len(), 2);
    assert_eq!(consumer.try_dequeue().unwrap().timestamp, 0);
    assert_eq!(consumer.try_dequeue().unwrap().timestamp, 1);
    assert!(consumer.try_dequeue().is_none());
}

#[tokio::test]
async fn test_stats_reports_tracked_devices() {
    let (app, _consumer) = setup_test_app(16).await;
    app.windows.observe("device-1", 10.0);
    app.windows.observe("device-2", 12.0);

    let response = app.router.oneshot(get_request("/stats")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.starts_with("devices_tracked=2\n"));
    assert!(body.contains("queue_capacity=16"));
}

#[tokio::test]
async fn test_end_to_end_anomaly_is_queryable() {
    let (app, consumer) = setup_test_app(256).await;

    let analyzer = Analyzer::new(
        app.windows.clone(),
        app.store.clone(),
        Arc::new(NoopMetrics),
        StructuredLogger::new("test"),
    );
    let handle = AnalyzerLoop::new(analyzer, consumer).spawn();

    for ts in 0..50 {
        let response = app
            .router
            .clone()
            .oneshot(ingest_request(&sample_json("device-9", ts, 10)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    app.router
        .clone()
        .oneshot(ingest_request(&sample_json("device-9", 50, 1000)))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while app
            .windows
            .stats("device-9")
            .map(|s| s.mean < 29.0)
            .unwrap_or(true)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("analyzer did not process the spike");
    handle.stop().await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get_request("/devices/device-9/anomalies"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let anomalies = body_json(response).await;
    assert_eq!(anomalies.as_array().unwrap().len(), 1);
    assert_eq!(anomalies[0]["ts"], 50);
    assert_eq!(anomalies[0]["rps"], 1000);
    assert!((anomalies[0]["z"].as_f64().unwrap() - 7.0).abs() < 1e-9);

    let response = app
        .router
        .clone()
        .oneshot(get_request("/devices/device-9/history?limit=3"))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 3);
    assert_eq!(history[0]["rps"], 1000);
    assert_eq!(history[0]["device"], "device-9");

    let response = app
        .router
        .oneshot(get_request("/devices/device-9/window"))
        .await
        .unwrap();
    let window = body_json(response).await;
    assert_eq!(window["count"], 50);
    assert_eq!(window["capacity"], 50);
}

#[tokio::test]
async fn test_window_for_unknown_device_is_404() {
    let (app, _consumer) = setup_test_app(16).await;

    let response = app
        .router
        .oneshot(get_request("/devices/nobody/window"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _consumer) = setup_test_app(16).await;

    let response = app.router.oneshot(get_request("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"].get(components::ANALYZER).is_some());
}

#[tokio::test]
async fn test_health_alias_reports_degraded_store() {
    let (app, _consumer) = setup_test_app(16).await;
    app.state
        .health_registry
        .set_degraded(components::STORE, "snapshot failed")
        .await;

    let response = app.router.oneshot(get_request("/health")).await.unwrap();

    // Degraded still returns 200 (operational)
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, _consumer) = setup_test_app(16).await;
    app.state
        .health_registry
        .set_unhealthy(components::ANALYZER, "stopped")
        .await;

    let response = app.router.oneshot(get_request("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = body_json(response).await;
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, _consumer) = setup_test_app(16).await;

    let response = app
        .router
        .clone()
        .oneshot(get_request("/readyz"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["ready"], false);

    app.state.health_registry.set_ready(true).await;

    let response = app.router.oneshot(get_request("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_service_counters() {
    let (app, _consumer) = setup_test_app(16).await;

    app.router
        .clone()
        .oneshot(ingest_request(&sample_json("device-1", 1, 75)))
        .await
        .unwrap();

    let response = app.router.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("service_rps_total"));
    assert!(body.contains("service_handle_latency_seconds"));
    assert!(body.contains("service_anomalies_total"));
}
