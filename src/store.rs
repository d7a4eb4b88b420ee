use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::model::{
    epoch_ms, ErrorRecord, MetricSample, NavigationRecord, PerformanceSnapshot, ResourceRecord,
};
use crate::rating::VitalMetric;

// ─── Public types ────────────────────────────────────────────────

/// Maximum retained entries per bounded buffer. The oldest entry is
/// evicted once a buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacities {
    pub errors: usize,
    pub resources: usize,
    /// Per custom-metric name
    pub custom: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            errors: 1_000,
            resources: 1_000,
            custom: 1_000,
        }
    }
}

/// Running CLS sum. Shifts that follow recent user input are excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClsAccumulator {
    sum: f64,
    counted: u32,
    ignored: u32,
}

impl ClsAccumulator {
    /// Whether a shift would be folded into the sum.
    pub fn counts(value: f64, had_recent_input: bool) -> bool {
        !had_recent_input && value.is_finite() && value >= 0.0
    }

    /// Fold one layout shift in. Returns the new sum if it counted.
    pub fn apply(&mut self, value: f64, had_recent_input: bool) -> Option<f64> {
        if !Self::counts(value, had_recent_input) {
            self.ignored += 1;
            return None;
        }
        self.sum += value;
        self.counted += 1;
        Some(self.sum)
    }

    pub fn value(&self) -> f64 {
        self.sum
    }

    pub fn counted(&self) -> u32 {
        self.counted
    }

    pub fn ignored(&self) -> u32 {
        self.ignored
    }
}

/// One queued mutation.
#[derive(Debug, Clone)]
enum StoreOp {
    Vital(MetricSample),
    LayoutShift {
        value: f64,
        had_recent_input: bool,
        timestamp: i64,
    },
    Resource(ResourceRecord),
    Error(ErrorRecord),
    Custom(MetricSample),
    Navigation(NavigationRecord),
}

/// The single mutable aggregate behind a `Telemetry` handle.
///
/// Writers only append to a pending queue; the queue is drained into the
/// snapshot under a short lock, opportunistically after each write and
/// unconditionally before every read or flush. Nothing is ever called
/// back while the snapshot lock is held, so a collector that triggers
/// another collector cannot observe a half-applied write.
pub struct SnapshotStore {
    pending: Mutex<Vec<StoreOp>>,
    state: Mutex<State>,
}

// ─── Internal state ──────────────────────────────────────────────

struct State {
    snapshot: PerformanceSnapshot,
    cls: ClsAccumulator,
    caps: Capacities,
}

// ─── SnapshotStore impl ──────────────────────────────────────────

impl SnapshotStore {
    pub fn new(caps: Capacities) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            state: Mutex::new(State {
                snapshot: PerformanceSnapshot::default(),
                cls: ClsAccumulator::default(),
                caps,
            }),
        }
    }

    /// Record a vital. Last write wins, except CLS, whose value is folded
    /// into the running sum as a shift without recent input.
    ///
    /// Returns false if the value was dropped (non-finite, or a CLS shift
    /// the accumulator ignores).
    pub fn record_vital(&self, metric: VitalMetric, value: f64) -> bool {
        if metric == VitalMetric::Cls {
            return self.record_layout_shift(value, false);
        }
        if !value.is_finite() {
            debug!(metric = metric.as_str(), value, "non-finite vital dropped");
            return false;
        }
        self.record(StoreOp::Vital(MetricSample::vital(metric, value)));
        true
    }

    /// Queue a layout shift. Returns true if it moves the CLS sum.
    pub fn record_layout_shift(&self, value: f64, had_recent_input: bool) -> bool {
        let counts = ClsAccumulator::counts(value, had_recent_input);
        self.record(StoreOp::LayoutShift {
            value,
            had_recent_input,
            timestamp: epoch_ms(),
        });
        counts
    }

    pub fn record_resource(&self, record: ResourceRecord) {
        self.record(StoreOp::Resource(record));
    }

    pub fn record_error(&self, record: ErrorRecord) {
        self.record(StoreOp::Error(record));
    }

    /// Append to the list named by `sample.name`, creating it on first use.
    /// Non-finite values are dropped.
    pub fn record_custom(&self, sample: MetricSample) -> bool {
        if !sample.value.is_finite() {
            debug!(metric = %sample.name, value = sample.value, "non-finite custom sample dropped");
            return false;
        }
        self.record(StoreOp::Custom(sample));
        true
    }

    /// Write-once; later calls are ignored.
    pub fn set_navigation(&self, record: NavigationRecord) {
        self.record(StoreOp::Navigation(record));
    }

    pub fn set_capacities(&self, caps: Capacities) {
        self.with_state(|state| {
            state.caps = caps;
            state.enforce_caps();
        });
    }

    pub fn vital(&self, metric: VitalMetric) -> Option<MetricSample> {
        self.with_state(|state| state.snapshot.vitals.get(&metric).cloned())
    }

    pub fn cls(&self) -> ClsAccumulator {
        self.with_state(|state| state.cls)
    }

    /// Independent point-in-time copy.
    pub fn read(&self) -> PerformanceSnapshot {
        self.with_state(|state| state.snapshot.clone())
    }

    /// Copy out the whole snapshot and empty the flushable buffers
    /// (errors, resources, custom) in the same critical section. Vitals
    /// and navigation stay.
    pub fn take_flushable(&self) -> PerformanceSnapshot {
        self.with_state(|state| {
            let snap = &mut state.snapshot;
            PerformanceSnapshot {
                vitals: snap.vitals.clone(),
                navigation: snap.navigation.clone(),
                resources: std::mem::take(&mut snap.resources),
                errors: std::mem::take(&mut snap.errors),
                custom: std::mem::take(&mut snap.custom),
                dropped: std::mem::take(&mut snap.dropped),
            }
        })
    }

    fn record(&self, op: StoreOp) {
        self.pending.lock().push(op);
        // Contended or nested: whoever holds the state drains it later.
        if let Some(mut state) = self.state.try_lock() {
            self.drain_into(&mut *state);
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock();
        self.drain_into(&mut *state);
        f(&mut *state)
    }

    fn drain_into(&self, state: &mut State) {
        loop {
            let ops = std::mem::take(&mut *self.pending.lock());
            if ops.is_empty() {
                break;
            }
            for op in ops {
                state.apply(op);
            }
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Capacities::default())
    }
}

// ─── State impl ──────────────────────────────────────────────────

impl State {
    fn apply(&mut self, op: StoreOp) {
        let snap = &mut self.snapshot;
        match op {
            StoreOp::Vital(sample) => {
                if let Ok(metric) = sample.name.parse::<VitalMetric>() {
                    snap.vitals.insert(metric, sample);
                }
            }
            StoreOp::LayoutShift {
                value,
                had_recent_input,
                timestamp,
            } => {
                if let Some(sum) = self.cls.apply(value, had_recent_input) {
                    let mut sample = MetricSample::vital(VitalMetric::Cls, sum);
                    sample.timestamp = timestamp;
                    snap.vitals.insert(VitalMetric::Cls, sample);
                }
            }
            StoreOp::Resource(record) => {
                snap.dropped.resources +=
                    push_bounded(&mut snap.resources, record, self.caps.resources);
            }
            StoreOp::Error(record) => {
                snap.dropped.errors += push_bounded(&mut snap.errors, record, self.caps.errors);
            }
            StoreOp::Custom(sample) => {
                let list = snap.custom.entry(sample.name.clone()).or_default();
                snap.dropped.custom += push_bounded(list, sample, self.caps.custom);
            }
            StoreOp::Navigation(record) => {
                if snap.navigation.is_none() {
                    snap.navigation = Some(record);
                }
            }
        }
    }

    fn enforce_caps(&mut self) {
        let snap = &mut self.snapshot;
        snap.dropped.errors += trim_front(&mut snap.errors, self.caps.errors);
        snap.dropped.resources += trim_front(&mut snap.resources, self.caps.resources);
        for list in snap.custom.values_mut() {
            snap.dropped.custom += trim_front(list, self.caps.custom);
        }
    }
}

/// Append, then evict from the front until within `cap`. Returns how
/// many entries were evicted.
fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) -> u64 {
    buf.push_back(item);
    trim_front(buf, cap)
}

fn trim_front<T>(buf: &mut VecDeque<T>, cap: usize) -> u64 {
    let cap = cap.max(1);
    let mut evicted = 0;
    while buf.len() > cap {
        buf.pop_front();
        evicted += 1;
    }
    evicted
}
