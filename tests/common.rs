//! Common test utilities for pipeline integration tests
//!
//! `RecordingTransport` captures every envelope as JSON at the moment it
//! is handed over, so tests can count POSTs without a network.

use parking_lot::Mutex;
use std::sync::Arc;

use storefront_telemetry::error::TransportError;
use storefront_telemetry::transport::{BestEffortDelivery, Envelope, SendFuture, Transport};
use storefront_telemetry::{LocalPlatform, Platform, Telemetry, TelemetryOptions};

pub const ENDPOINT: &str = "http://collector.test/api/telemetry";

#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<serde_json::Value>>>,
    fail: bool,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Envelopes whose `type` is `kind` (`vital` / `error`).
    pub fn events(&self, kind: &str) -> Vec<serde_json::Value> {
        self
            .sent()
            .into_iter()
            .filter(|e| e["type"] == kind)
            .collect()
    }

    /// Flush bodies (no `type` key).
    pub fn batches(&self) -> Vec<serde_json::Value> {
        self
            .sent()
            .into_iter()
            .filter(|e| e.get("type").is_none())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, _endpoint: &str, envelope: &Envelope) -> SendFuture {
        let json = serde_json::to_value(envelope).expect("envelope serializes");
        self.sent.lock().push(json);
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(TransportError::Rejected("collector offline".into()))
            } else {
                Ok(())
            }
        })
    }
}

#[allow(dead_code)]
pub struct Harness {
    pub platform: Arc<LocalPlatform>,
    pub transport: RecordingTransport,
    pub telemetry: Telemetry,
}

/// Pipeline over `platform` with a recording transport. Not initialized.
#[allow(dead_code)]
pub fn harness(platform: LocalPlatform) -> Harness {
    harness_with(platform, RecordingTransport::default())
}

#[allow(dead_code)]
pub fn harness_with(platform: LocalPlatform, transport: RecordingTransport) -> Harness {
    let platform = Arc::new(platform);
    let delivery = Arc::new(BestEffortDelivery::new(transport.clone()));
    let telemetry = Telemetry::new(platform.clone() as Arc<dyn Platform>, delivery);
    Harness {
        platform,
        transport,
        telemetry,
    }
}

#[allow(dead_code)]
pub fn page() -> LocalPlatform {
    LocalPlatform::new("https://storefront.test/products/42")
}

/// Endpoint set, every event kept, no flush timer.
#[allow(dead_code)]
pub fn options() -> TelemetryOptions {
    TelemetryOptions::default()
        .endpoint(ENDPOINT)
        .sampling_rate(1.0)
        .flush_interval_ms(0)
}
