use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::model::{epoch_ms, Context, ResourceRecord};
use crate::pipeline::Pipeline;
use crate::platform::{EntryKind, PerformanceEntry, ResourceTiming};

/// Resources slower than this also raise a `slow-resource` custom metric.
pub const SLOW_RESOURCE_MS: f64 = 1_000.0;

pub(crate) fn install(pipeline: &Arc<Pipeline>) -> usize {
    let active = super::subscribe(pipeline, &[EntryKind::Resource], handle);
    debug!(active, "resource collector installed");
    active
}

pub(crate) fn handle(pipeline: &Pipeline, entry: PerformanceEntry) {
    let PerformanceEntry::Resource(timing) = entry else {
        return;
    };
    let record = to_record(timing);

    if record.duration_ms > SLOW_RESOURCE_MS {
        let context = Context::from([
            ("url".to_owned(), json!(record.name)),
            ("duration".to_owned(), json!(record.duration_ms)),
            ("type".to_owned(), json!(record.kind)),
        ]);
        let duration = record.duration_ms;
        pipeline.store.record_resource(record);
        pipeline.record_custom("slow-resource", duration, context);
    } else {
        pipeline.store.record_resource(record);
    }
}

pub(crate) fn to_record(timing: ResourceTiming) -> ResourceRecord {
    ResourceRecord {
        cached: timing.transfer_size == 0 && timing.decoded_body_size > 0,
        name: timing.name,
        kind: timing.initiator_type,
        duration_ms: timing.duration,
        size_bytes: timing.transfer_size,
        timestamp: epoch_ms(),
    }
}
