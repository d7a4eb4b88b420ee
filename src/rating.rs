use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─── Public types ────────────────────────────────────────────────

/// Three-level quality grade for a Web Vital (plus `Unknown` for
/// metrics with no published thresholds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
    Unknown,
}

/// The closed set of Web Vitals the pipeline knows how to grade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VitalMetric {
    #[serde(rename = "FCP")]
    Fcp,
    #[serde(rename = "LCP")]
    Lcp,
    #[serde(rename = "FID")]
    Fid,
    #[serde(rename = "CLS")]
    Cls,
    #[serde(rename = "TTFB")]
    Ttfb,
}

/// `good` when `value <= good`, `poor` when `value > poor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub good: f64,
    pub poor: f64,
}

// ─── VitalMetric impl ────────────────────────────────────────────

impl VitalMetric {
    pub const ALL: [VitalMetric; 5] = [
        VitalMetric::Fcp,
        VitalMetric::Lcp,
        VitalMetric::Fid,
        VitalMetric::Cls,
        VitalMetric::Ttfb,
    ];

    /// Short wire name, e.g. `"LCP"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fcp => "FCP",
            Self::Lcp => "LCP",
            Self::Fid => "FID",
            Self::Cls => "CLS",
            Self::Ttfb => "TTFB",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            Self::Fcp => "first-contentful-paint",
            Self::Lcp => "largest-contentful-paint",
            Self::Fid => "first-input-delay",
            Self::Cls => "cumulative-layout-shift",
            Self::Ttfb => "time-to-first-byte",
        }
    }

    /// Fixed grading thresholds. Milliseconds for everything except CLS,
    /// which is a unitless layout-shift score.
    pub fn thresholds(self) -> Thresholds {
        let (good, poor) = match self {
            Self::Fcp => (1800.0, 3000.0),
            Self::Lcp => (2500.0, 4000.0),
            Self::Fid => (100.0, 300.0),
            Self::Cls => (0.1, 0.25),
            Self::Ttfb => (800.0, 1800.0),
        };
        Thresholds { good, poor }
    }

    pub fn rate(self, value: f64) -> Rating {
        let t = self.thresholds();
        if value <= t.good {
            Rating::Good
        } else if value > t.poor {
            Rating::Poor
        } else {
            Rating::NeedsImprovement
        }
    }
}

impl fmt::Display for VitalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts either the short (`LCP`) or long (`largest-contentful-paint`)
/// name, case-insensitively.
impl FromStr for VitalMetric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| {
                s.eq_ignore_ascii_case(m.as_str())
                    || s.eq_ignore_ascii_case(m.long_name())
            })
            .ok_or(())
    }
}

// ─── Classifier ──────────────────────────────────────────────────

/// Grade a named metric. Unrecognised names are always `Unknown`.
pub fn classify(name: &str, value: f64) -> Rating {
    match name.parse::<VitalMetric>() {
        Ok(metric) => metric.rate(value),
        Err(()) => Rating::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_for_every_metric() {
        for metric in VitalMetric::ALL {
            let t = metric.thresholds();
            let eps = t.good * 1e-3;
            assert_eq!(classify(metric.as_str(), t.good - eps), Rating::Good);
            assert_eq!(classify(metric.as_str(), t.good), Rating::Good);
            assert_eq!(
                classify(metric.long_name(), t.poor),
                Rating::NeedsImprovement
            );
            assert_eq!(classify(metric.long_name(), t.poor + eps), Rating::Poor);
        }
    }

    #[test]
    fn lcp_thresholds() {
        assert_eq!(classify("LCP", 2500.0), Rating::Good);
        assert_eq!(classify("LCP", 3200.0), Rating::NeedsImprovement);
        assert_eq!(classify("LCP", 4000.1), Rating::Poor);
    }

    #[test]
    fn unknown_names() {
        assert_eq!(classify("slow-resource", 0.0), Rating::Unknown);
        assert_eq!(classify("", 1.0e9), Rating::Unknown);
        assert_eq!(classify("timing-checkout", 5.0), Rating::Unknown);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("cls".parse::<VitalMetric>(), Ok(VitalMetric::Cls));
        assert_eq!(
            "Time-To-First-Byte".parse::<VitalMetric>(),
            Ok(VitalMetric::Ttfb)
        );
    }

    #[test]
    fn serializes_as_short_names() {
        let json = serde_json::to_string(&VitalMetric::Lcp).unwrap();
        assert_eq!(json, "\"LCP\"");
        let json = serde_json::to_string(&Rating::NeedsImprovement).unwrap();
        assert_eq!(json, "\"needs-improvement\"");
    }
}
