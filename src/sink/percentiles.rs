use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentile breakdown of one vital as received by the sink.
/// Values are divided back out of the histogram's integer scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: u64,
}

impl PercentileSet {
    /// Zeroed set when the histogram is empty. `scale` is the factor the
    /// values were multiplied by before recording.
    pub fn from_histogram(hist: &Histogram<u64>, scale: f64) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }
        let at = |p: f64| hist.value_at_percentile(p) as f64 / scale;

        Self {
            min: hist.min() as f64 / scale,
            max: hist.max() as f64 / scale,
            mean: hist.mean() / scale,
            p50: at(50.0),
            p75: at(75.0),
            p95: at(95.0),
            p99: at(99.0),
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            p50: 0.0,
            p75: 0.0,
            p95: 0.0,
            p99: 0.0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}
