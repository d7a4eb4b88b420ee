use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{Context, ErrorReport};
use crate::pipeline::Pipeline;
use crate::platform::{ErrorCallback, GlobalError};

/// Hook uncaught errors and unhandled rejections. Returns whether the
/// platform accepted the hooks.
pub(crate) fn install(pipeline: &Arc<Pipeline>) -> bool {
    let weak = Arc::downgrade(pipeline);
    let callback: ErrorCallback = Arc::new(move |error: GlobalError| {
        if let Some(pipeline) = weak.upgrade() {
            let report = ErrorReport {
                message: error.message,
                stack: error.stack,
            };
            pipeline.capture_error(report, error.kind, Context::new());
        }
    });

    match pipeline.platform.install_error_hooks(callback) {
        Ok(()) => {
            debug!("global error hooks installed");
            true
        }
        Err(e) => {
            warn!(error = %e, "error tracking unavailable");
            false
        }
    }
}
