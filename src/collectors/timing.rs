use tracing::debug;

use crate::model::Context;
use crate::pipeline::Pipeline;

/// Remember when `name` started. A second start overwrites the first.
pub(crate) fn mark_start(pipeline: &Pipeline, name: &str) {
    match pipeline.platform.now_ms() {
        Some(now) => {
            pipeline.marks.lock().insert(name.to_owned(), now);
        }
        None => debug!(mark = name, "no monotonic clock, mark ignored"),
    }
}

/// Elapsed ms since the matching start, recorded as `timing-<name>`.
/// Missing clock or missing start yields 0 and records nothing.
pub(crate) fn mark_end(pipeline: &Pipeline, name: &str) -> f64 {
    let Some(now) = pipeline.platform.now_ms() else {
        debug!(mark = name, "no monotonic clock, timing skipped");
        return 0.0;
    };
    let Some(start) = pipeline.marks.lock().remove(name) else {
        debug!(mark = name, "mark_end without mark_start");
        return 0.0;
    };

    let elapsed = (now - start).max(0.0);
    pipeline.record_custom(&format!("timing-{name}"), elapsed, Context::new());
    elapsed
}
