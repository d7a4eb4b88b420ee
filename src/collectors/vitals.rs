use std::sync::Arc;

use tracing::debug;

use crate::pipeline::Pipeline;
use crate::platform::{EntryKind, PerformanceEntry};
use crate::rating::VitalMetric;
use crate::transport::TelemetryEvent;

const KINDS: [EntryKind; 4] = [
    EntryKind::Paint,
    EntryKind::LargestContentfulPaint,
    EntryKind::FirstInput,
    EntryKind::LayoutShift,
];

/// Paint entries other than this one are not graded.
const FCP_ENTRY: &str = "first-contentful-paint";

pub(crate) fn install(pipeline: &Arc<Pipeline>) -> usize {
    let active = super::subscribe(pipeline, &KINDS, handle);
    debug!(active, "vitals collector installed");
    active
}

pub(crate) fn handle(pipeline: &Pipeline, entry: PerformanceEntry) {
    match entry {
        PerformanceEntry::Paint { name, start_time } => {
            if name == FCP_ENTRY {
                record(pipeline, VitalMetric::Fcp, start_time);
            }
        }
        PerformanceEntry::LargestContentfulPaint { start_time } => {
            record(pipeline, VitalMetric::Lcp, start_time);
        }
        PerformanceEntry::FirstInput {
            start_time,
            processing_start,
        } => {
            record(pipeline, VitalMetric::Fid, (processing_start - start_time).max(0.0));
        }
        PerformanceEntry::LayoutShift {
            value,
            had_recent_input,
        } => {
            // Shifts after input, or with a bogus value, leave CLS as it was
            if !pipeline.store.record_layout_shift(value, had_recent_input) {
                return;
            }
            if let Some(cls) = pipeline.store.vital(VitalMetric::Cls) {
                pipeline.emit(TelemetryEvent::Vital(cls));
            }
        }
        PerformanceEntry::Resource(_) => {}
    }
}

/// Store a vital, then emit what the store now holds for it. A dropped
/// value emits nothing.
pub(crate) fn record(pipeline: &Pipeline, metric: VitalMetric, value: f64) {
    if !pipeline.store.record_vital(metric, value) {
        return;
    }
    if let Some(sample) = pipeline.store.vital(metric) {
        pipeline.emit(TelemetryEvent::Vital(sample));
    }
}
