use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TelemetryConfig;
use crate::model::{epoch_ms, DeviceInfo, EnrichedSnapshot};
use crate::transport::{Delivery, Envelope, EventEnvelope, TelemetryEvent};

/// Outcome of one immediate emit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Dispatched,
    NoEndpoint,
    SampledOut,
    NoRuntime,
}

/// Both outbound paths: sampled fire-and-forget events and unsampled,
/// awaited batch flushes.
pub struct Emitter {
    delivery: Arc<dyn Delivery>,
    sampler: Mutex<StdRng>,
    session_id: Uuid,
}

impl Emitter {
    pub fn new(delivery: Arc<dyn Delivery>, session_id: Uuid) -> Self {
        Self {
            delivery,
            sampler: Mutex::new(StdRng::from_entropy()),
            session_id,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Keep an event with probability `rate`.
    fn sample(&self, rate: f64) -> bool {
        let draw: f64 = self.sampler.lock().gen();
        draw < rate
    }

    /// Send `event` without waiting for the network. Dropped events are
    /// not queued or retried.
    pub fn emit(
        &self,
        config: &TelemetryConfig,
        event: TelemetryEvent,
        device_info: DeviceInfo,
    ) -> EmitOutcome {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return EmitOutcome::NoEndpoint;
        };
        if !self.sample(config.sampling_rate) {
            debug!("telemetry event sampled out");
            return EmitOutcome::SampledOut;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available, dropping telemetry event");
            return EmitOutcome::NoRuntime;
        };

        let envelope = Envelope::Event(EventEnvelope {
            event,
            timestamp: epoch_ms(),
            session_id: self.session_id,
            device_info,
        });
        let delivery = self.delivery.deliver(endpoint, envelope, timeout_of(config));
        runtime.spawn(delivery);
        EmitOutcome::Dispatched
    }

    /// POST a full batch and wait for the attempt to settle.
    pub async fn flush(&self, config: &TelemetryConfig, batch: EnrichedSnapshot) {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return;
        };
        self.delivery
            .deliver(endpoint, Envelope::Batch(batch), timeout_of(config))
            .await;
    }
}

fn timeout_of(config: &TelemetryConfig) -> Duration {
    Duration::from_millis(config.request_timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricSample;
    use crate::transport::DeliveryFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Delivery for Counting {
        fn deliver(&self, _endpoint: &str, _envelope: Envelope, _timeout: Duration) -> DeliveryFuture {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    fn config(endpoint: Option<&str>, sampling_rate: f64) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: endpoint.map(str::to_owned),
            sampling_rate,
            ..TelemetryConfig::default()
        }
    }

    fn vital() -> TelemetryEvent {
        TelemetryEvent::Vital(MetricSample::vital(crate::VitalMetric::Lcp, 1200.0))
    }

    #[tokio::test]
    async fn emit_reports_why_an_event_was_dropped() {
        let delivery = Arc::new(Counting::default());
        let emitter = Emitter::new(delivery.clone(), Uuid::nil());
        let device = DeviceInfo::default();

        let outcome = emitter.emit(&config(None, 1.0), vital(), device.clone());
        assert_eq!(outcome, EmitOutcome::NoEndpoint);

        let outcome = emitter.emit(&config(Some("http://collector.test"), 0.0), vital(), device.clone());
        assert_eq!(outcome, EmitOutcome::SampledOut);

        let outcome = emitter.emit(&config(Some("http://collector.test"), 1.0), vital(), device);
        assert_eq!(outcome, EmitOutcome::Dispatched);

        assert_eq!(delivery.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_outside_runtime_is_dropped() {
        let delivery = Arc::new(Counting::default());
        let emitter = Emitter::new(delivery.clone(), Uuid::nil());

        let outcome = emitter.emit(
            &config(Some("http://collector.test"), 1.0),
            vital(),
            DeviceInfo::default(),
        );
        assert_eq!(outcome, EmitOutcome::NoRuntime);
        assert_eq!(delivery.0.load(Ordering::SeqCst), 0);
    }
}
