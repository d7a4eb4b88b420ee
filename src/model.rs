use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rating::{classify, Rating, VitalMetric};

/// Free-form key/value context attached to errors and custom metrics.
pub type Context = BTreeMap<String, serde_json::Value>;

/// Milliseconds since the Unix epoch.
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─── Samples ─────────────────────────────────────────────────────

/// One graded observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub rating: Rating,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Context>,
}

impl MetricSample {
    /// Build a sample graded by the fixed classifier.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        let rating = classify(&name, value);
        Self {
            name,
            value,
            rating,
            timestamp: epoch_ms(),
            extra: None,
        }
    }

    pub fn vital(metric: VitalMetric, value: f64) -> Self {
        Self {
            name: metric.as_str().to_owned(),
            value,
            rating: metric.rate(value),
            timestamp: epoch_ms(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: Context) -> Self {
        if !extra.is_empty() {
            self.extra = Some(extra);
        }
        self
    }
}

// ─── Errors ──────────────────────────────────────────────────────

/// Where an error record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Uncaught error / panic caught by a global hook.
    Uncaught,
    /// Unhandled promise rejection / detached task failure.
    UnhandledRejection,
    /// Explicitly reported by application code.
    Reported,
}

/// Append-only. Duplicate errors are kept as separate records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    pub stack: Option<String>,
    pub timestamp: i64,
    pub url: String,
    pub user_agent: String,
    pub context: Context,
    pub kind: ErrorKind,
}

/// An error as handed to the pipeline, before page metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// The error's display string, with its `source()` chain as the stack.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

// ─── Resources ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Resource URL
    pub name: String,
    /// Initiator type, e.g. `img`, `fetch`, `script`
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_ms: f64,
    pub size_bytes: u64,
    /// Served from a local cache: nothing transferred, body non-empty
    pub cached: bool,
    pub timestamp: i64,
}

// ─── Navigation ──────────────────────────────────────────────────

/// Page-load phase breakdown, computed once per process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRecord {
    pub dns_ms: f64,
    pub connect_ms: f64,
    pub request_ms: f64,
    pub response_ms: f64,
    pub dom_processing_ms: f64,
    pub load_complete_ms: f64,
    pub dom_ready_ms: f64,
    pub ttfb_ms: f64,
    pub navigation_type: String,
    pub redirect_count: u32,
}

// ─── Environment ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub effective_type: String,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<f64>,
    pub save_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub user_agent: String,
    pub platform: String,
    pub language: String,
    pub hardware_concurrency: usize,
    pub device_memory_gb: Option<f64>,
    pub connection: Option<ConnectionInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub limit_bytes: u64,
}

// ─── Snapshot ────────────────────────────────────────────────────

/// How many entries each bounded buffer has evicted since the last flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedCounts {
    pub errors: u64,
    pub resources: u64,
    pub custom: u64,
}

/// The aggregate root. Readers only ever see clones of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub vitals: BTreeMap<VitalMetric, MetricSample>,
    pub resources: VecDeque<ResourceRecord>,
    pub errors: VecDeque<ErrorRecord>,
    pub navigation: Option<NavigationRecord>,
    pub custom: BTreeMap<String, VecDeque<MetricSample>>,
    pub dropped: DroppedCounts,
}

impl PerformanceSnapshot {
    pub fn total_resource_bytes(&self) -> u64 {
        self.resources.iter().map(|r| r.size_bytes).sum()
    }

    pub fn custom_sample_count(&self) -> usize {
        self.custom.values().map(VecDeque::len).sum()
    }
}

/// Point-in-time copy of the store enriched with live environment data.
/// This is also the body of a periodic flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSnapshot {
    #[serde(flatten)]
    pub snapshot: PerformanceSnapshot,
    pub device_info: DeviceInfo,
    pub memory: Option<MemoryInfo>,
    pub session_id: Uuid,
    pub url: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("checkout failed")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("payment gateway unreachable")]
    struct Inner;

    #[test]
    fn error_report_walks_source_chain() {
        let report = ErrorReport::from_error(&Outer(Inner));
        assert_eq!(report.message, "checkout failed");
        assert_eq!(
            report.stack.as_deref(),
            Some("caused by: payment gateway unreachable")
        );
    }

    #[test]
    fn vital_sample_is_graded() {
        let sample = MetricSample::vital(VitalMetric::Fid, 250.0);
        assert_eq!(sample.name, "FID");
        assert_eq!(sample.rating, Rating::NeedsImprovement);
    }

    #[test]
    fn resource_record_wire_shape() {
        let record = ResourceRecord {
            name: "https://cdn.shop.test/hero.webp".into(),
            kind: "img".into(),
            duration_ms: 120.0,
            size_bytes: 0,
            cached: true,
            timestamp: 1,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "img");
        assert_eq!(json["durationMs"], 120.0);
        assert_eq!(json["cached"], true);
    }
}
