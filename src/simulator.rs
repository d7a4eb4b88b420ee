use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::model::{Context, ErrorReport};
use crate::platform::{LocalPlatform, PerformanceEntry, ResourceTiming};
use crate::telemetry::Telemetry;

// ─── Storefront catalog ──────────────────────────────────────────

const CDN: &str = "https://cdn.storefront.test";
const API: &str = "https://api.storefront.test";

const CATEGORIES: &[&str] = &["shoes", "outerwear", "bags", "accessories", "denim"];

const CHECKOUT_ERRORS: &[&str] = &[
    "payment widget failed to load",
    "cart quantity out of sync",
    "review carousel: image decode error",
    "address autocomplete timed out",
];

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `workers` Tokio tasks that browse a fake storefront, feeding
/// `platform` with performance entries and `telemetry` with manual
/// timings, custom metrics and errors, until the deadline or until
/// `running` is cleared.
pub async fn run(
    running: Arc<AtomicBool>,
    platform: Arc<LocalPlatform>,
    telemetry: Telemetry,
    workers: u32,
    duration_secs: u64,
) {
    let deadline = Instant::now() + Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(workers as usize);
    for worker_id in 0..workers {
        let running = running.clone();
        let platform = platform.clone();
        let telemetry = telemetry.clone();

        handles.push(tokio::spawn(async move {
            let views = worker(worker_id, running, platform, telemetry, deadline).await;
            info!(worker_id, views, "simulated shopper finished");
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    platform: Arc<LocalPlatform>,
    telemetry: Telemetry,
    deadline: Instant,
) -> u64 {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut views = 0;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        page_view(&mut rng, &platform, &telemetry);
        views += 1;

        let pause = rng.gen_range(50..250u64);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
    views
}

/// One product-listing page view.
pub fn page_view(rng: &mut StdRng, platform: &LocalPlatform, telemetry: &Telemetry) {
    let category = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
    telemetry.mark_start("product-listing");

    // ── Paint & vitals ──────────────────────────────────────────
    let fcp = rng.gen_range(400.0..3200.0);
    platform.dispatch(PerformanceEntry::Paint {
        name: "first-paint".into(),
        start_time: fcp * 0.8,
    });
    platform.dispatch(PerformanceEntry::Paint {
        name: "first-contentful-paint".into(),
        start_time: fcp,
    });
    platform.dispatch(PerformanceEntry::LargestContentfulPaint {
        start_time: fcp + rng.gen_range(100.0..2500.0),
    });
    if rng.gen_bool(0.7) {
        let start = rng.gen_range(1000.0..6000.0);
        platform.dispatch(PerformanceEntry::FirstInput {
            start_time: start,
            processing_start: start + rng.gen_range(2.0..350.0),
        });
    }
    for _ in 0..rng.gen_range(0..3) {
        platform.dispatch(PerformanceEntry::LayoutShift {
            value: rng.gen_range(0.0..0.02),
            had_recent_input: rng.gen_bool(0.3),
        });
    }

    // ── Resources ───────────────────────────────────────────────
    let listing = ResourceTiming {
        name: format!("{API}/products?category={category}"),
        initiator_type: "fetch".into(),
        start_time: 50.0,
        duration: rng.gen_range(40.0..1600.0),
        transfer_size: rng.gen_range(2_000..40_000),
        decoded_body_size: rng.gen_range(10_000..200_000),
    };
    platform.dispatch(PerformanceEntry::Resource(listing));

    for _ in 0..rng.gen_range(4..12) {
        let cached = rng.gen_bool(0.35);
        let decoded = rng.gen_range(8_000..400_000);
        platform.dispatch(PerformanceEntry::Resource(ResourceTiming {
            name: format!("{CDN}/img/{category}/prod_{:04}.webp", rng.gen_range(1..=500u32)),
            initiator_type: "img".into(),
            start_time: rng.gen_range(100.0..2000.0),
            duration: if cached {
                rng.gen_range(1.0..15.0)
            } else {
                rng.gen_range(30.0..1800.0)
            },
            transfer_size: if cached { 0 } else { decoded },
            decoded_body_size: decoded,
        }));
    }

    // ── Application signals ─────────────────────────────────────
    if rng.gen_bool(0.2) {
        let context = Context::from([("category".to_owned(), json!(category))]);
        telemetry.track_custom_metric("add-to-cart", rng.gen_range(20.0..400.0), context);
    }
    if rng.gen_bool(0.05) {
        let message = CHECKOUT_ERRORS[rng.gen_range(0..CHECKOUT_ERRORS.len())];
        let context = Context::from([
            ("component".to_owned(), json!("checkout")),
            ("category".to_owned(), json!(category)),
        ]);
        telemetry.report_error(ErrorReport::new(message), context);
    }

    telemetry.mark_end("product-listing");
}
