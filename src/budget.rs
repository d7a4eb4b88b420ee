use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::PerformanceSnapshot;
use crate::rating::VitalMetric;

pub const RESOURCE_COUNT_KEY: &str = "resourceCount";
pub const TOTAL_SIZE_KEY: &str = "totalSize";

// ─── Budget ──────────────────────────────────────────────────────

/// Ceilings the current snapshot is checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceBudget {
    pub vitals: BTreeMap<VitalMetric, f64>,
    pub max_resource_count: u64,
    pub max_total_bytes: u64,
}

impl Default for PerformanceBudget {
    fn default() -> Self {
        Self {
            vitals: BTreeMap::from([
                (VitalMetric::Lcp, 2500.0),
                (VitalMetric::Fid, 100.0),
                (VitalMetric::Cls, 0.1),
            ]),
            max_resource_count: 100,
            max_total_bytes: 2 * 1024 * 1024,
        }
    }
}

impl PerformanceBudget {
    pub fn merged(mut self, overrides: BudgetOverrides) -> Self {
        self.vitals.extend(overrides.vitals);
        if let Some(count) = overrides.resource_count {
            self.max_resource_count = count;
        }
        if let Some(bytes) = overrides.total_bytes {
            self.max_total_bytes = bytes;
        }
        self
    }
}

/// Caller-supplied budget entries, merged over the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetOverrides {
    pub vitals: BTreeMap<VitalMetric, f64>,
    pub resource_count: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl BudgetOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vital(mut self, metric: VitalMetric, ceiling: f64) -> Self {
        self.vitals.insert(metric, ceiling);
        self
    }

    pub fn resource_count(mut self, max: u64) -> Self {
        self.resource_count = Some(max);
        self
    }

    pub fn total_bytes(mut self, max: u64) -> Self {
        self.total_bytes = Some(max);
        self
    }

    /// Build from a flat name → ceiling map (`{"LCP": 2000, "totalSize": 1e6}`).
    /// Unknown names are logged and ignored.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Self {
        let mut overrides = Self::default();
        for (name, &ceiling) in map {
            if let Ok(metric) = name.parse::<VitalMetric>() {
                overrides.vitals.insert(metric, ceiling);
            } else if name == RESOURCE_COUNT_KEY {
                overrides.resource_count = Some(ceiling.max(0.0) as u64);
            } else if name == TOTAL_SIZE_KEY {
                overrides.total_bytes = Some(ceiling.max(0.0) as u64);
            } else {
                warn!(budget = %name, "unknown budget entry ignored");
            }
        }
        overrides
    }
}

// ─── Report ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Vital,
    Resource,
}

/// `violation` is how far `actual` overshoots `budget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub metric: String,
    pub actual: f64,
    pub budget: f64,
    pub violation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    /// Number of comparisons made
    pub checked: usize,
    pub violations: usize,
    pub resource_count: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub summary: BudgetSummary,
}

// ─── Evaluation ──────────────────────────────────────────────────

/// Compare `snapshot` against `budget`. Read-only.
pub fn evaluate(snapshot: &PerformanceSnapshot, budget: &PerformanceBudget) -> BudgetReport {
    let mut violations = Vec::new();
    let mut checked = 0;

    let mut check = |kind, metric: &str, actual: f64, ceiling: f64| {
        checked += 1;
        if actual > ceiling {
            violations.push(Violation {
                kind,
                metric: metric.to_owned(),
                actual,
                budget: ceiling,
                violation: actual - ceiling,
            });
        }
    };

    for (metric, sample) in &snapshot.vitals {
        if let Some(&ceiling) = budget.vitals.get(metric) {
            check(ViolationKind::Vital, metric.as_str(), sample.value, ceiling);
        }
    }

    let resource_count = snapshot.resources.len() as u64;
    let total_bytes = snapshot.total_resource_bytes();
    check(
        ViolationKind::Resource,
        RESOURCE_COUNT_KEY,
        resource_count as f64,
        budget.max_resource_count as f64,
    );
    check(
        ViolationKind::Resource,
        TOTAL_SIZE_KEY,
        total_bytes as f64,
        budget.max_total_bytes as f64,
    );

    BudgetReport {
        passed: violations.is_empty(),
        summary: BudgetSummary {
            checked,
            violations: violations.len(),
            resource_count,
            total_bytes,
        },
        violations,
    }
}
