use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::percentiles::PercentileSet;
use crate::error::IngestError;
use crate::model::epoch_ms;

// ─── Configuration ───────────────────────────────────────────────

/// How many envelopes we keep for the live feed
const MAX_RECENT: usize = 200;

/// HdrHistogram range: 1 → 1 h in ms (CLS is scaled ×1000), 3 sig figs
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000;
const HIST_SIGFIG: u8 = 3;

const CLS_SCALE: f64 = 1_000.0;

// ─── Incoming payloads ───────────────────────────────────────────

/// Whatever a pipeline POSTs. Events need `type` and `data`; batches need
/// `sessionId` and `timestamp`. Everything else is optional so older
/// clients still parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Event(IncomingEvent),
    Batch(IncomingBatch),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingBatch {
    #[serde(default)]
    pub vitals: BTreeMap<String, IncomingSample>,
    #[serde(default)]
    pub resources: Vec<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub custom: BTreeMap<String, Vec<IncomingSample>>,
    pub session_id: String,
    pub timestamp: i64,
}

/// `value` is `null` when a client serialized NaN.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingSample {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub rating: String,
}

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe aggregate of everything the sink has received.
pub struct TelemetryAggregate {
    inner: Mutex<Inner>,
}

/// A single entry in the live feed.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEnvelope {
    pub received_ms: i64,
    pub kind: String,
    pub session_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSummary {
    pub percentiles: PercentileSet,
    pub good: u64,
    pub needs_improvement: u64,
    pub poor: u64,
}

/// Complete snapshot served as JSON and over SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkSnapshot {
    pub vitals: BTreeMap<String, VitalSummary>,

    // Counters
    pub total_envelopes: u64,
    pub total_vitals: u64,
    pub total_errors: u64,
    pub total_batches: u64,
    pub total_resources: u64,
    pub total_custom_samples: u64,
    pub unique_sessions: usize,
    pub envelopes_per_sec: f64,
    pub elapsed_secs: f64,

    pub recent: Vec<RecentEnvelope>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    vitals: BTreeMap<String, VitalAccumulator>,

    total_envelopes: u64,
    total_vitals: u64,
    total_errors: u64,
    total_batches: u64,
    total_resources: u64,
    total_custom_samples: u64,
    sessions: HashSet<String>,

    recent: VecDeque<RecentEnvelope>,

    // Wall-clock anchor for elapsed time
    start_time: Option<Instant>,
}

struct VitalAccumulator {
    hist: Histogram<u64>,
    scale: f64,
    good: u64,
    needs_improvement: u64,
    poor: u64,
}

// ─── TelemetryAggregate impl ─────────────────────────────────────

impl TelemetryAggregate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Count one envelope. A rejected envelope leaves every counter as
    /// it was.
    pub fn ingest(&self, incoming: Incoming) -> Result<(), IngestError> {
        self.inner.lock().ingest(incoming)
    }

    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for TelemetryAggregate {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            vitals: BTreeMap::new(),
            total_envelopes: 0,
            total_vitals: 0,
            total_errors: 0,
            total_batches: 0,
            total_resources: 0,
            total_custom_samples: 0,
            sessions: HashSet::new(),
            recent: VecDeque::with_capacity(MAX_RECENT + 1),
            start_time: None,
        }
    }

    fn ingest(&mut self, incoming: Incoming) -> Result<(), IngestError> {
        let (kind, session_id, detail) = match incoming {
            Incoming::Event(event) => {
                let detail = match event.kind.as_str() {
                    "vital" => {
                        let sample = serde_json::from_value::<IncomingSample>(event.data)
                            .map_err(|e| IngestError::MalformedVital(e.to_string()))?;
                        let Some(value) = sample.value.filter(|v| v.is_finite()) else {
                            return Err(IngestError::MalformedVital(format!(
                                "`{}` has no numeric value",
                                sample.name
                            )));
                        };
                        self.record_vital(&sample.name, value, &sample.rating);
                        format!("{} = {}", sample.name, value)
                    }
                    "error" => {
                        self.total_errors += 1;
                        event
                            .data
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("<no message>")
                            .to_owned()
                    }
                    other => format!("ignored event type `{other}`"),
                };
                (event.kind, event.session_id, detail)
            }
            Incoming::Batch(batch) => {
                self.total_batches += 1;
                self.total_errors += batch.errors.len() as u64;
                self.total_resources += batch.resources.len() as u64;
                let custom: u64 = batch.custom.values().map(|v| v.len() as u64).sum();
                self.total_custom_samples += custom;
                let detail = format!(
                    "{} vitals, {} resources, {} errors, {} custom",
                    batch.vitals.len(),
                    batch.resources.len(),
                    batch.errors.len(),
                    custom
                );
                ("batch".to_owned(), batch.session_id, detail)
            }
        };

        self.start_time.get_or_insert_with(Instant::now);
        self.total_envelopes += 1;
        if !session_id.is_empty() {
            self.sessions.insert(session_id.clone());
        }
        self.recent.push_back(RecentEnvelope {
            received_ms: epoch_ms(),
            kind,
            session_id,
            detail,
        });
        if self.recent.len() > MAX_RECENT {
            self.recent.pop_front();
        }
        Ok(())
    }

    fn record_vital(&mut self, name: &str, value: f64, rating: &str) {
        self.total_vitals += 1;
        let acc = self
            .vitals
            .entry(name.to_owned())
            .or_insert_with(|| VitalAccumulator::new(name));

        // Clamp to ≥ 1 so the histogram accepts zero-valued samples
        let scaled = (value * acc.scale).round().max(1.0) as u64;
        let _ = acc.hist.record(scaled.min(HIST_HIGH));

        match rating {
            "good" => acc.good += 1,
            "needs-improvement" => acc.needs_improvement += 1,
            "poor" => acc.poor += 1,
            _ => {}
        }
    }

    fn snapshot(&self) -> SinkSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let rate = if elapsed_secs > 0.0 {
            self.total_envelopes as f64 / elapsed_secs
        } else {
            0.0
        };

        SinkSnapshot {
            vitals: self
                .vitals
                .iter()
                .map(|(name, acc)| (name.clone(), acc.summary()))
                .collect(),
            total_envelopes: self.total_envelopes,
            total_vitals: self.total_vitals,
            total_errors: self.total_errors,
            total_batches: self.total_batches,
            total_resources: self.total_resources,
            total_custom_samples: self.total_custom_samples,
            unique_sessions: self.sessions.len(),
            envelopes_per_sec: rate,
            elapsed_secs,
            recent: self.recent.iter().cloned().collect(),
        }
    }
}

impl VitalAccumulator {
    fn new(name: &str) -> Self {
        Self {
            hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            scale: if name.eq_ignore_ascii_case("CLS") {
                CLS_SCALE
            } else {
                1.0
            },
            good: 0,
            needs_improvement: 0,
            poor: 0,
        }
    }

    fn summary(&self) -> VitalSummary {
        VitalSummary {
            percentiles: PercentileSet::from_histogram(&self.hist, self.scale),
            good: self.good,
            needs_improvement: self.needs_improvement,
            poor: self.poor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Incoming {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn events_and_batches_are_told_apart() {
        let event = parse(json!({
            "type": "vital",
            "data": {"name": "LCP", "value": 1800.0, "rating": "good", "timestamp": 1},
            "timestamp": 1,
            "sessionId": "s1",
            "deviceInfo": {}
        }));
        assert!(matches!(event, Incoming::Event(_)));

        let batch = parse(json!({
            "vitals": {},
            "resources": [],
            "errors": [],
            "custom": {},
            "sessionId": "s1",
            "timestamp": 2
        }));
        assert!(matches!(batch, Incoming::Batch(_)));
    }

    #[test]
    fn vital_percentiles_and_ratings() {
        let agg = TelemetryAggregate::new();
        for (value, rating) in [(1000.0, "good"), (2000.0, "good"), (3000.0, "needs-improvement")] {
            agg.ingest(parse(json!({
                "type": "vital",
                "data": {"name": "LCP", "value": value, "rating": rating},
                "sessionId": "s1"
            })))
            .unwrap();
        }
        let snap = agg.snapshot();
        let lcp = &snap.vitals["LCP"];
        assert_eq!(lcp.percentiles.count, 3);
        assert_eq!(lcp.good, 2);
        assert_eq!(lcp.needs_improvement, 1);
        assert!((lcp.percentiles.max - 3000.0).abs() < 5.0);
        assert_eq!(snap.unique_sessions, 1);
        assert_eq!(snap.total_vitals, 3);
    }

    #[test]
    fn cls_is_scaled() {
        let agg = TelemetryAggregate::new();
        agg.ingest(parse(json!({
            "type": "vital",
            "data": {"name": "CLS", "value": 0.12, "rating": "needs-improvement"},
            "sessionId": "s1"
        })))
        .unwrap();
        let cls = &agg.snapshot().vitals["CLS"];
        assert!((cls.percentiles.p50 - 0.12).abs() < 0.001);
    }

    #[test]
    fn batch_counters() {
        let agg = TelemetryAggregate::new();
        agg.ingest(parse(json!({
            "vitals": {"LCP": {"name": "LCP", "value": 900.0, "rating": "good"}},
            "resources": [{}, {}],
            "errors": [{}],
            "custom": {"timing-checkout": [{"name": "timing-checkout", "value": 5.0}]},
            "sessionId": "s2",
            "timestamp": 3
        })))
        .unwrap();
        let snap = agg.snapshot();
        assert_eq!(snap.total_batches, 1);
        assert_eq!(snap.total_resources, 2);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.total_custom_samples, 1);
        assert_eq!(snap.recent[0].kind, "batch");
    }

    #[test]
    fn recent_feed_is_bounded() {
        let agg = TelemetryAggregate::new();
        for i in 0..(MAX_RECENT + 25) {
            agg.ingest(parse(json!({
                "type": "error",
                "data": {"message": format!("e{i}")},
                "sessionId": "s"
            })))
            .unwrap();
        }
        let snap = agg.snapshot();
        assert_eq!(snap.recent.len(), MAX_RECENT);
        assert_eq!(snap.recent[0].detail, "e25");
        assert_eq!(snap.total_errors, (MAX_RECENT + 25) as u64);
    }

    #[test]
    fn bodies_that_are_neither_event_nor_batch_fail_to_parse() {
        for body in [json!({"hello": 1}), json!({"type": "vital"}), json!([]), json!({})] {
            assert!(
                serde_json::from_value::<Incoming>(body.clone()).is_err(),
                "{body} parsed"
            );
        }
    }

    #[test]
    fn malformed_vital_event_is_rejected_without_counting() {
        let agg = TelemetryAggregate::new();
        for data in [json!({}), json!({"name": "LCP", "value": null})] {
            let err = agg
                .ingest(parse(json!({"type": "vital", "data": data, "sessionId": "s1"})))
                .unwrap_err();
            assert!(matches!(err, IngestError::MalformedVital(_)));
        }
        let snap = agg.snapshot();
        assert_eq!(snap.total_envelopes, 0);
        assert_eq!(snap.total_vitals, 0);
        assert_eq!(snap.unique_sessions, 0);
    }

    #[test]
    fn batch_with_null_values_is_still_counted() {
        let agg = TelemetryAggregate::new();
        agg.ingest(parse(json!({
            "vitals": {"LCP": {"name": "LCP", "value": null, "rating": "poor"}},
            "custom": {"search": [{"name": "search", "value": null}, {"name": "search", "value": 4.0}]},
            "errors": [{"message": "x"}],
            "sessionId": "s3",
            "timestamp": 4
        })))
        .unwrap();
        let snap = agg.snapshot();
        assert_eq!(snap.total_batches, 1);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.total_custom_samples, 2);
    }
}
