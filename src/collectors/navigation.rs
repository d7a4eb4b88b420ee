use tracing::debug;

use crate::pipeline::Pipeline;
use crate::rating::VitalMetric;

/// Capture the one-time navigation record. With vitals enabled, TTFB is
/// derived from it and recorded like any other vital.
pub(crate) fn capture(pipeline: &Pipeline, record_ttfb: bool) {
    let Some(timing) = pipeline.platform.navigation_timing() else {
        debug!("navigation timing unavailable");
        return;
    };
    let record = timing.record();
    let ttfb = record.ttfb_ms;
    pipeline.store.set_navigation(record);

    if record_ttfb && ttfb > 0.0 {
        super::vitals::record(pipeline, VitalMetric::Ttfb, ttfb);
    }
}
