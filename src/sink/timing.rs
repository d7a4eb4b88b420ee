use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::debug;

/// Adds `Server-Timing` to every response and logs API calls at debug.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    // Skip the long-lived SSE stream
    if path.starts_with("/api/") && !path.ends_with("/stream") {
        debug!(
            status = response.status().as_u16(),
            %method,
            %path,
            us = elapsed.as_micros() as u64,
            "sink request"
        );
    }

    response
}
