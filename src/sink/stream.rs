use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::aggregate::SinkSnapshot;
use super::SinkState;

// ─── GET /api/telemetry ──────────────────────────────────────────
/// One-off JSON summary, for curl.

pub async fn get_summary(State(state): State<Arc<SinkState>>) -> Json<SinkSnapshot> {
    Json(state.aggregate.snapshot())
}

// ─── GET /api/telemetry/stream ───────────────────────────────────
/// Server-Sent Events: the summary as JSON every 500 ms.

pub async fn summary_stream(
    State(state): State<Arc<SinkState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.aggregate.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
