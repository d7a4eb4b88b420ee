//! Event sources that write into the snapshot store.
//!
//! Each collector subscribes through the [`Platform`](crate::platform::Platform)
//! seam with a callback that holds the pipeline weakly, so a dropped
//! `Telemetry` leaves only inert subscriptions behind.

pub(crate) mod errors;
pub(crate) mod navigation;
pub(crate) mod resources;
pub(crate) mod timing;
pub(crate) mod vitals;

use std::sync::{Arc, Weak};

use tracing::warn;

use crate::pipeline::Pipeline;
use crate::platform::{EntryCallback, EntryKind, PerformanceEntry};

/// Subscribe `handler` to `kinds`. Unsupported kinds are logged and
/// skipped; returns how many subscriptions succeeded.
fn subscribe(
    pipeline: &Arc<Pipeline>,
    kinds: &[EntryKind],
    handler: fn(&Pipeline, PerformanceEntry),
) -> usize {
    let mut active = 0;
    for &kind in kinds {
        let weak: Weak<Pipeline> = Arc::downgrade(pipeline);
        let callback: EntryCallback = Arc::new(move |entry| {
            if let Some(pipeline) = weak.upgrade() {
                handler(&pipeline, entry);
            }
        });
        match pipeline.platform.observe(kind, callback) {
            Ok(()) => active += 1,
            Err(e) => warn!(%kind, error = %e, "performance observer unavailable"),
        }
    }
    active
}
