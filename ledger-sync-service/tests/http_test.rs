//! Integration tests for the HTTP trigger and probes.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::*;
use ledger_sync_service::models::RunWatermark;
use ledger_sync_service::services::{init_metrics, MemoryRowStore, MemorySource, MemoryWatermarkStore};
use ledger_sync_service::startup::{router, AppState};
use ledger_sync_service::sync::{FixedClock, SyncOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn update_returns_the_run_summary() {
    let harness = TestHarness::new(
        at(2023, 3, 11, 9, 0),
        synced_at(at(2023, 3, 10, 8, 0)),
    );
    harness.source.push(vec![transaction(
        "TX1",
        "T0006",
        "2023-03-10T10:00:00+0000",
        "25.00",
    )]);

    let response = router(harness.app_state())
        .oneshot(get("/update"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        body_text(response).await,
        "1 new transaction from 09.03.2023 to 11.03.2023."
    );
}

#[tokio::test]
async fn update_with_invalid_watermark_is_a_bad_request() {
    let harness = TestHarness::new(
        at(2023, 3, 10, 9, 0),
        synced_at(at(2023, 3, 12, 9, 0)),
    );

    let response = router(harness.app_state())
        .oneshot(get("/update"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("in the future"));
}

#[tokio::test(start_paused = true)]
async fn overlapping_update_is_a_conflict() {
    let source = Arc::new(SlowSource {
        inner: MemorySource::new(),
        delay: Duration::from_secs(5),
    });
    let watermarks = Arc::new(MemoryWatermarkStore::new(synced_at(at(2023, 3, 10, 8, 0))));
    let clock = Arc::new(FixedClock(at(2023, 3, 11, 9, 0)));
    let orchestrator = SyncOrchestrator::new(
        source.clone(),
        Arc::new(MemoryRowStore::new()),
        watermarks.clone(),
        clock.clone(),
        &settings(),
    )
    .unwrap();
    let app = router(AppState {
        orchestrator: Arc::new(orchestrator),
        source,
        watermarks,
        clock,
        report: settings().report,
        db: None,
    });

    let (first, second) = tokio::join!(
        app.clone().oneshot(get("/update")),
        app.clone().oneshot(get("/update"))
    );

    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn sales_report_covers_previous_month() {
    let harness = TestHarness::new(at(2023, 3, 10, 9, 0), RunWatermark::new(date(2023, 1, 1)));
    harness.source.push(vec![
        transaction("TX1", "T0006", "2023-02-03T10:00:00+0000", "25.00"),
        transaction("TX2", "T0006", "2023-02-20T10:00:00+0000", "25.00"),
        transaction("TX3", "T0006", "2023-03-02T10:00:00+0000", "25.00"),
    ]);

    let response = router(harness.app_state())
        .oneshot(get("/report/sales"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        body["report"],
        "Sales of February: 2 | Gross: 50.00 EUR | Fees: -1.30 EUR | Net: 48.70 EUR"
    );
    assert_eq!(body["summary"]["count"], 2);
}

#[tokio::test]
async fn health_reports_idle_sync() {
    let harness = TestHarness::new(at(2023, 3, 10, 9, 0), RunWatermark::new(date(2023, 1, 1)));

    let response = router(harness.app_state())
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sync_running"], false);
}

#[tokio::test]
async fn ready_without_database_is_ok() {
    let harness = TestHarness::new(at(2023, 3, 10, 9, 0), RunWatermark::new(date(2023, 1, 1)));

    let response = router(harness.app_state())
        .oneshot(get("/ready"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_exposes_sync_counters() {
    init_metrics();
    let harness = TestHarness::new(
        at(2023, 3, 11, 9, 0),
        synced_at(at(2023, 3, 10, 8, 0)),
    );
    let app = router(harness.app_state());
    app.clone().oneshot(get("/update")).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("ledger_sync_runs_total"));
    assert!(text.contains("http_requests_total"));
}
