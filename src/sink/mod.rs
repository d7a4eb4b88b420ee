//! Collection endpoint: receives what [`Telemetry`](crate::Telemetry)
//! POSTs and aggregates it for inspection.

pub mod aggregate;
pub mod percentiles;
pub mod stream;
pub mod timing;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

pub use aggregate::{Incoming, SinkSnapshot, TelemetryAggregate};

/// Shared state handed to every sink handler.
#[derive(Default)]
pub struct SinkState {
    pub aggregate: TelemetryAggregate,
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

// ─── POST /api/telemetry ─────────────────────────────────────────

pub async fn ingest(
    State(state): State<Arc<SinkState>>,
    payload: Result<Json<Incoming>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(incoming) = payload.map_err(|e| {
        debug!(error = %e, "rejected telemetry payload");
        AppError::BadRequest(e.body_text())
    })?;
    state.aggregate.ingest(incoming).map_err(|e| {
        debug!(error = %e, "rejected telemetry envelope");
        AppError::BadRequest(e.to_string())
    })?;
    Ok(StatusCode::ACCEPTED)
}

// ─── POST /api/telemetry/reset ───────────────────────────────────

pub async fn reset(State(state): State<Arc<SinkState>>) -> StatusCode {
    state.aggregate.reset();
    StatusCode::NO_CONTENT
}

// ─── Router ──────────────────────────────────────────────────────

/// Builds the sink `Router` with CORS (storefront pages post
/// cross-origin) and request timing.
pub fn router(state: Arc<SinkState>) -> Router {
    Router::new()
        .route("/api/telemetry", post(ingest).get(stream::get_summary))
        .route("/api/telemetry/reset", post(reset))
        .route("/api/telemetry/stream", get(stream::summary_stream))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
