use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::{self, BudgetOverrides, BudgetReport, PerformanceBudget};
use crate::collectors;
use crate::config::{TelemetryConfig, TelemetryOptions};
use crate::emitter::Emitter;
use crate::model::{Context, EnrichedSnapshot, ErrorKind, ErrorReport};
use crate::pipeline::Pipeline;
use crate::platform::Platform;
use crate::store::Capacities;
use crate::transport::{BestEffortDelivery, Delivery, HttpTransport};

/// Handle to one telemetry pipeline. Cheap to clone; every clone talks
/// to the same store.
///
/// Nothing here returns an error or panics: failures are logged and the
/// affected event is dropped.
#[derive(Clone)]
pub struct Telemetry {
    pipeline: Arc<Pipeline>,
}

impl Telemetry {
    pub fn new(platform: Arc<dyn Platform>, delivery: Arc<dyn Delivery>) -> Self {
        let emitter = Emitter::new(delivery, Uuid::new_v4());
        Self {
            pipeline: Arc::new(Pipeline::new(platform, emitter)),
        }
    }

    /// Pipeline that POSTs JSON with reqwest, best effort.
    pub fn http(platform: Arc<dyn Platform>) -> Self {
        Self::new(
            platform,
            Arc::new(BestEffortDelivery::new(HttpTransport::new())),
        )
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Merge `options`, install collectors and hooks, capture navigation
    /// timing and start the flush timer. Only the first call does anything.
    pub fn initialize(&self, options: TelemetryOptions) {
        if self.pipeline.initialized.swap(true, Ordering::SeqCst) {
            debug!("telemetry already initialized");
            return;
        }

        let config = {
            let mut config = self.pipeline.config.write();
            config.merge(options);
            config.normalize();
            config.clone()
        };
        self.pipeline.store.set_capacities(Capacities {
            errors: config.max_errors,
            resources: config.max_resources,
            custom: config.max_custom_samples,
        });

        if config.enable_error_tracking {
            collectors::errors::install(&self.pipeline);
        }
        if config.enable_vitals {
            collectors::vitals::install(&self.pipeline);
        }
        if config.enable_resource_timing {
            collectors::resources::install(&self.pipeline);
        }
        collectors::navigation::capture(&self.pipeline, config.enable_vitals);

        if config.flush_enabled() {
            self.start_flush_timer(Duration::from_millis(config.flush_interval_ms));
        }

        info!(
            session_id = %self.session_id(),
            endpoint = config.endpoint.as_deref().unwrap_or("<none>"),
            sampling_rate = config.sampling_rate,
            flush_interval_ms = config.flush_interval_ms,
            "telemetry initialized"
        );
    }

    fn start_flush_timer(&self, period: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available, periodic flush disabled");
            return;
        };
        let pipeline = Arc::downgrade(&self.pipeline);

        let task = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(interval);

            while ticks.next().await.is_some() {
                let Some(pipeline) = pipeline.upgrade() else {
                    break;
                };
                pipeline.flush().await;
            }
        });
        *self.pipeline.flush_task.lock() = Some(task);
    }

    /// Stop the periodic flush. Collected data stays readable.
    pub fn shutdown(&self) {
        if let Some(task) = self.pipeline.flush_task.lock().take() {
            task.abort();
            info!("telemetry flush timer stopped");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pipeline.initialized.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Uuid {
        self.pipeline.emitter.session_id()
    }

    pub fn config(&self) -> TelemetryConfig {
        self.pipeline.config()
    }

    // ── Application-facing collectors ───────────────────────────

    pub fn track_custom_metric(&self, name: &str, value: f64, context: Context) {
        self.pipeline.record_custom(name, value, context);
    }

    pub fn track_error(&self, error: &(dyn std::error::Error + 'static), context: Context) {
        self.report_error(ErrorReport::from_error(error), context);
    }

    pub fn report_error(&self, report: ErrorReport, context: Context) {
        self.pipeline
            .capture_error(report, ErrorKind::Reported, context);
    }

    pub fn mark_start(&self, name: &str) {
        collectors::timing::mark_start(&self.pipeline, name);
    }

    /// Elapsed ms since `mark_start(name)`, or 0 without one.
    pub fn mark_end(&self, name: &str) -> f64 {
        collectors::timing::mark_end(&self.pipeline, name)
    }

    // ── Readers ─────────────────────────────────────────────────

    /// Independent copy of the snapshot with live device, memory and
    /// session info.
    pub fn performance_data(&self) -> EnrichedSnapshot {
        self.pipeline.enrich(self.pipeline.store.read())
    }

    /// Run the flush logic now, outside the timer.
    pub async fn flush_metrics(&self) {
        self.pipeline.flush().await;
    }

    pub fn check_performance_budget(&self, overrides: Option<BudgetOverrides>) -> BudgetReport {
        let budget = PerformanceBudget::default().merged(overrides.unwrap_or_default());
        budget::evaluate(&self.pipeline.store.read(), &budget)
    }
}
