use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::emitter::{EmitOutcome, Emitter};
use crate::model::{
    epoch_ms, Context, EnrichedSnapshot, ErrorKind, ErrorRecord, ErrorReport, MetricSample,
    PerformanceSnapshot,
};
use crate::platform::Platform;
use crate::store::SnapshotStore;
use crate::transport::TelemetryEvent;

/// Shared state behind every `Telemetry` handle. Collectors hold it
/// weakly; the flush loop holds it weakly.
pub(crate) struct Pipeline {
    pub config: RwLock<TelemetryConfig>,
    pub store: SnapshotStore,
    pub platform: Arc<dyn Platform>,
    pub emitter: Emitter,
    pub marks: Mutex<HashMap<String, f64>>,
    pub initialized: AtomicBool,
    pub flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(platform: Arc<dyn Platform>, emitter: Emitter) -> Self {
        Self {
            config: RwLock::new(TelemetryConfig::default()),
            store: SnapshotStore::default(),
            platform,
            emitter,
            marks: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            flush_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> TelemetryConfig {
        self.config.read().clone()
    }

    /// Sampled, fire-and-forget emit of a vital or error.
    pub fn emit(&self, event: TelemetryEvent) -> EmitOutcome {
        let device_info = self.platform.device_info();
        let config = self.config.read();
        self.emitter.emit(&config, event, device_info)
    }

    /// Append to a custom-metric list, if custom metrics are enabled.
    pub fn record_custom(&self, name: &str, value: f64, context: Context) {
        if !self.config.read().enable_custom_metrics {
            debug!(metric = name, "custom metrics disabled, dropping sample");
            return;
        }
        self.store
            .record_custom(MetricSample::new(name, value).with_extra(context));
    }

    /// Turn a report into a record, append it and emit it.
    pub fn capture_error(&self, report: ErrorReport, kind: ErrorKind, context: Context) {
        let record = ErrorRecord {
            message: report.message,
            stack: report.stack,
            timestamp: epoch_ms(),
            url: self.platform.page_url(),
            user_agent: self.platform.device_info().user_agent,
            context,
            kind,
        };
        self.store.record_error(record.clone());
        self.emit(TelemetryEvent::Error(record));
    }

    pub fn enrich(&self, snapshot: PerformanceSnapshot) -> EnrichedSnapshot {
        EnrichedSnapshot {
            snapshot,
            device_info: self.platform.device_info(),
            memory: self.platform.memory_info(),
            session_id: self.emitter.session_id(),
            url: self.platform.page_url(),
            timestamp: epoch_ms(),
        }
    }

    /// Capture-and-reset the flushable buffers, then POST the batch.
    /// Buffers are cleared whether or not the POST succeeds.
    pub async fn flush(&self) {
        let config = self.config();
        if config.endpoint.is_none() {
            debug!("no telemetry endpoint configured, skipping flush");
            return;
        }
        let batch = self.enrich(self.store.take_flushable());
        debug!(
            errors = batch.snapshot.errors.len(),
            resources = batch.snapshot.resources.len(),
            custom = batch.snapshot.custom_sample_count(),
            "flushing telemetry batch"
        );
        self.emitter.flush(&config, batch).await;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.get_mut().take() {
            task.abort();
        }
    }
}
