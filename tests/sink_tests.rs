//! End-to-end tests: a real `Telemetry` posting over HTTP to the axum
//! collection endpoint on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use storefront_telemetry::platform::PerformanceEntry;
use storefront_telemetry::sink::{self, SinkSnapshot, SinkState};
use storefront_telemetry::{
    Context, ErrorReport, LocalPlatform, Platform, Telemetry, TelemetryOptions,
};

async fn start_sink() -> (String, Arc<SinkState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let state = Arc::new(SinkState::default());
    let app = sink::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("sink serves");
    });
    (format!("http://{addr}"), state)
}

/// Poll until `pred` holds or two seconds pass.
async fn wait_for(state: &SinkState, pred: impl Fn(&SinkSnapshot) -> bool) -> SinkSnapshot {
    for _ in 0..100 {
        let snap = state.aggregate.snapshot();
        if pred(&snap) {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    state.aggregate.snapshot()
}

/// Vitals, errors and a batch all reach the sink
#[tokio::test]
async fn test_pipeline_posts_to_sink() {
    let (base, state) = start_sink().await;
    let platform = Arc::new(LocalPlatform::new("https://storefront.test/cart"));
    let telemetry = Telemetry::http(platform.clone() as Arc<dyn Platform>);
    telemetry.initialize(
        TelemetryOptions::default()
            .endpoint(format!("{base}/api/telemetry"))
            .sampling_rate(1.0)
            .flush_interval_ms(0),
    );

    platform.dispatch(PerformanceEntry::LargestContentfulPaint { start_time: 2100.0 });
    telemetry.report_error(ErrorReport::new("coupon service down"), Context::new());
    telemetry.track_custom_metric("add-to-cart", 140.0, Context::new());
    telemetry.flush_metrics().await;

    let snap = wait_for(&state, |s| s.total_envelopes >= 3).await;
    assert_eq!(snap.total_envelopes, 3);
    assert_eq!(snap.total_batches, 1);
    assert_eq!(snap.total_vitals, 1);
    // One immediate error plus the same error inside the batch
    assert_eq!(snap.total_errors, 2);
    assert_eq!(snap.total_custom_samples, 1);
    assert_eq!(snap.unique_sessions, 1);
    assert_eq!(snap.vitals["LCP"].good, 1);
}

/// Malformed bodies are rejected with a JSON error
#[tokio::test]
async fn test_sink_rejects_malformed_json() {
    let (base, state) = start_sink().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/telemetry"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request sent");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], 400);
    assert_eq!(state.aggregate.snapshot().total_envelopes, 0);
}

/// Summary endpoint and reset
#[tokio::test]
async fn test_summary_and_reset() {
    let (base, state) = start_sink().await;
    let client = reqwest::Client::new();

    let accepted = client
        .post(format!("{base}/api/telemetry"))
        .json(&serde_json::json!({
            "type": "error",
            "data": {"message": "x"},
            "sessionId": "s1"
        }))
        .send()
        .await
        .expect("request sent");
    assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);
    assert!(accepted.headers().contains_key("server-timing"));

    let summary: serde_json::Value = client
        .get(format!("{base}/api/telemetry"))
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("json body");
    assert_eq!(summary["totalErrors"], 1);

    let reset = client
        .post(format!("{base}/api/telemetry/reset"))
        .send()
        .await
        .expect("request sent");
    assert_eq!(reset.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(state.aggregate.snapshot().total_envelopes, 0);
}

/// An unreachable endpoint never surfaces to the caller
#[tokio::test]
async fn test_unreachable_endpoint_is_harmless() {
    let platform = Arc::new(LocalPlatform::new("https://storefront.test/"));
    let telemetry = Telemetry::http(platform.clone() as Arc<dyn Platform>);
    telemetry.initialize(
        TelemetryOptions {
            request_timeout_ms: Some(500),
            ..TelemetryOptions::default()
        }
        .endpoint("http://127.0.0.1:9/api/telemetry")
        .flush_interval_ms(0),
    );

    telemetry.report_error(ErrorReport::new("offline"), Context::new());
    telemetry.flush_metrics().await;
    assert!(telemetry.performance_data().snapshot.errors.is_empty());
}

/// Bodies that are valid JSON but no envelope are rejected, not counted
#[tokio::test]
async fn test_sink_rejects_non_envelopes() {
    let (base, state) = start_sink().await;
    let client = reqwest::Client::new();

    for body in [
        serde_json::json!({"hello": 1}),
        serde_json::json!({"type": "vital"}),
        serde_json::json!([]),
        serde_json::json!({"type": "vital", "data": {}, "sessionId": "s1"}),
    ] {
        let response = client
            .post(format!("{base}/api/telemetry"))
            .json(&body)
            .send()
            .await
            .expect("request sent");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST, "{body}");
    }

    let snap = state.aggregate.snapshot();
    assert_eq!(snap.total_envelopes, 0);
    assert_eq!(snap.total_batches, 0);
}

/// A non-finite vital is dropped at record time, so every later batch
/// still reaches the sink
#[tokio::test]
async fn test_non_finite_vital_does_not_poison_batches() {
    let (base, state) = start_sink().await;
    let platform = Arc::new(LocalPlatform::new("https://storefront.test/search"));
    let telemetry = Telemetry::http(platform.clone() as Arc<dyn Platform>);
    telemetry.initialize(
        TelemetryOptions::default()
            .endpoint(format!("{base}/api/telemetry"))
            .sampling_rate(1.0)
            .flush_interval_ms(0),
    );

    platform.dispatch(PerformanceEntry::LargestContentfulPaint { start_time: f64::NAN });
    telemetry.track_custom_metric("search", f64::NAN, Context::new());

    for round in 1..=3u64 {
        telemetry.track_custom_metric("search", 30.0, Context::new());
        telemetry.flush_metrics().await;
        let snap = wait_for(&state, |s| s.total_batches >= round).await;
        assert_eq!(snap.total_batches, round);
        assert_eq!(snap.total_custom_samples, round);
    }
    assert_eq!(state.aggregate.snapshot().total_vitals, 0);
    assert!(telemetry.performance_data().snapshot.vitals.is_empty());
}
