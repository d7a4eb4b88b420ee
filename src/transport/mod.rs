pub mod delivery;
pub mod http;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use uuid::Uuid;

use crate::error::TransportError;
use crate::model::{DeviceInfo, EnrichedSnapshot, ErrorRecord, MetricSample};

pub use delivery::{BestEffortDelivery, Delivery, DeliveryFuture};
pub use http::HttpTransport;

// ─── Wire format ─────────────────────────────────────────────────

/// The payload of an immediate emit. Serialized as
/// `{"type": "vital"|"error", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum TelemetryEvent {
    Vital(MetricSample),
    Error(ErrorRecord),
}

/// `{type, data, timestamp, sessionId, deviceInfo}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: TelemetryEvent,
    pub timestamp: i64,
    pub session_id: Uuid,
    pub device_info: DeviceInfo,
}

/// Everything that can be POSTed to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Event(EventEnvelope),
    /// Periodic or manual flush: the whole enriched snapshot
    Batch(EnrichedSnapshot),
}

impl Envelope {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Event(EventEnvelope {
                event: TelemetryEvent::Vital(_),
                ..
            }) => "vital",
            Self::Event(EventEnvelope {
                event: TelemetryEvent::Error(_),
                ..
            }) => "error",
            Self::Batch(_) => "batch",
        }
    }
}

// ─── Transport trait ─────────────────────────────────────────────

pub type SendFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// One POST to the collection endpoint. Implementations do any
/// synchronous request building inside `send` and return the in-flight
/// part as the future; they never retry.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, endpoint: &str, envelope: &Envelope) -> SendFuture;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::VitalMetric;

    #[test]
    fn event_envelope_wire_shape() {
        let envelope = Envelope::Event(EventEnvelope {
            event: TelemetryEvent::Vital(MetricSample::vital(VitalMetric::Lcp, 3000.0)),
            timestamp: 42,
            session_id: Uuid::nil(),
            device_info: DeviceInfo::default(),
        });
        assert_eq!(envelope.label(), "vital");

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "vital");
        assert_eq!(json["data"]["name"], "LCP");
        assert_eq!(json["data"]["rating"], "needs-improvement");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["sessionId"], Uuid::nil().to_string());
        assert!(json["deviceInfo"].is_object());
    }
}
