use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use storefront_telemetry::platform::NavigationTiming;
use storefront_telemetry::sink::{self, SinkState};
use storefront_telemetry::{simulator, LocalPlatform, Platform, Telemetry, TelemetryOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storefront_telemetry=debug")),
        )
        .init();

    // ── 1. Bind the collection endpoint ──────────────────────────
    let addr: String = env_or("TELEMETRY_BIND", "127.0.0.1:3000".to_owned());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind collection endpoint");
            std::process::exit(1);
        }
    };
    let endpoint = format!("http://{addr}/api/telemetry");

    let sink_state = Arc::new(SinkState::default());
    let app = sink::router(sink_state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "collection endpoint exited");
        }
    });
    info!(%endpoint, "collection endpoint listening");
    info!("summary → http://{addr}/api/telemetry, stream → http://{addr}/api/telemetry/stream");

    // ── 2. Build the pipeline ────────────────────────────────────
    let platform = Arc::new(
        LocalPlatform::new("https://storefront.test/products")
            .route_panics()
            .with_navigation(NavigationTiming {
                navigation_type: "navigate".into(),
                domain_lookup_start: 2.0,
                domain_lookup_end: 18.0,
                connect_start: 18.0,
                connect_end: 52.0,
                request_start: 53.0,
                response_start: 210.0,
                response_end: 290.0,
                dom_interactive: 720.0,
                dom_content_loaded_event_end: 790.0,
                dom_complete: 1340.0,
                load_event_end: 1385.0,
                ..NavigationTiming::default()
            }),
    );
    let telemetry = Telemetry::http(platform.clone() as Arc<dyn Platform>);
    telemetry.initialize(
        TelemetryOptions::default()
            .endpoint(endpoint)
            .sampling_rate(env_or("TELEMETRY_SAMPLING_RATE", 0.5))
            .flush_interval_ms(env_or("TELEMETRY_FLUSH_INTERVAL_MS", 5_000)),
    );

    // ── 3. Drive simulated shoppers ──────────────────────────────
    let workers: u32 = env_or("SIM_WORKERS", 4);
    let duration_secs: u64 = env_or("SIM_DURATION_SECS", 60);
    info!(workers, duration_secs, "starting simulated storefront traffic");

    let running = Arc::new(AtomicBool::new(true));
    simulator::run(running, platform, telemetry.clone(), workers, duration_secs).await;

    // ── 4. Final flush & budget check ────────────────────────────
    let report = telemetry.check_performance_budget(None);
    telemetry.flush_metrics().await;
    telemetry.shutdown();

    match serde_json::to_string_pretty(&report) {
        Ok(json) => info!(passed = report.passed, "performance budget\n{json}"),
        Err(e) => error!(error = %e, "could not render budget report"),
    }
}
