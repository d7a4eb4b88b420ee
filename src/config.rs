use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

// ─── Defaults ────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_sampling_rate() -> f64 {
    1.0
}
fn default_batch_size() -> usize {
    50
}
fn default_flush_interval_ms() -> u64 {
    30_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_capacity() -> usize {
    1_000
}

// ─── Effective configuration ─────────────────────────────────────

/// Settings the pipeline runs with. Starts at the defaults and is
/// overlaid once by `Telemetry::initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enable_vitals: bool,

    #[serde(default = "default_true")]
    pub enable_resource_timing: bool,

    #[serde(default = "default_true")]
    pub enable_error_tracking: bool,

    #[serde(default = "default_true")]
    pub enable_custom_metrics: bool,

    /// Probability (0.0–1.0) that an immediate vital/error emit is sent
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,

    /// Collection URL; `None` disables all network emission
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Reserved; the flush path always sends the whole snapshot
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Periodic flush interval; 0 disables the timer
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Upper bound on a single POST
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_capacity")]
    pub max_errors: usize,

    #[serde(default = "default_capacity")]
    pub max_resources: usize,

    /// Per custom-metric name
    #[serde(default = "default_capacity")]
    pub max_custom_samples: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_vitals: true,
            enable_resource_timing: true,
            enable_error_tracking: true,
            enable_custom_metrics: true,
            sampling_rate: default_sampling_rate(),
            endpoint: None,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_errors: default_capacity(),
            max_resources: default_capacity(),
            max_custom_samples: default_capacity(),
        }
    }
}

impl TelemetryConfig {
    /// Parse a JSON document (camelCase keys) and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(ConfigError::SamplingRate(self.sampling_rate));
        }
        if self.max_errors == 0 {
            return Err(ConfigError::ZeroCapacity("maxErrors"));
        }
        if self.max_resources == 0 {
            return Err(ConfigError::ZeroCapacity("maxResources"));
        }
        if self.max_custom_samples == 0 {
            return Err(ConfigError::ZeroCapacity("maxCustomSamples"));
        }
        Ok(())
    }

    /// Overlay `options` onto `self`.
    pub fn merge(&mut self, options: TelemetryOptions) {
        let TelemetryOptions {
            enable_vitals,
            enable_resource_timing,
            enable_error_tracking,
            enable_custom_metrics,
            sampling_rate,
            endpoint,
            batch_size,
            flush_interval_ms,
            request_timeout_ms,
            max_errors,
            max_resources,
            max_custom_samples,
        } = options;

        if let Some(v) = enable_vitals {
            self.enable_vitals = v;
        }
        if let Some(v) = enable_resource_timing {
            self.enable_resource_timing = v;
        }
        if let Some(v) = enable_error_tracking {
            self.enable_error_tracking = v;
        }
        if let Some(v) = enable_custom_metrics {
            self.enable_custom_metrics = v;
        }
        if let Some(v) = sampling_rate {
            self.sampling_rate = v;
        }
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
        if let Some(v) = batch_size {
            self.batch_size = v;
        }
        if let Some(v) = flush_interval_ms {
            self.flush_interval_ms = v;
        }
        if let Some(v) = request_timeout_ms {
            self.request_timeout_ms = v;
        }
        if let Some(v) = max_errors {
            self.max_errors = v;
        }
        if let Some(v) = max_resources {
            self.max_resources = v;
        }
        if let Some(v) = max_custom_samples {
            self.max_custom_samples = v;
        }
    }

    /// Repair out-of-range values instead of failing; initialization
    /// must never fail for the host.
    pub fn normalize(&mut self) {
        if let Err(e) = self.validate() {
            warn!(error = %e, "telemetry config out of range, normalizing");
        }
        self.sampling_rate = if self.sampling_rate.is_nan() {
            default_sampling_rate()
        } else {
            self.sampling_rate.clamp(0.0, 1.0)
        };
        for cap in [
            &mut self.max_errors,
            &mut self.max_resources,
            &mut self.max_custom_samples,
        ] {
            if *cap == 0 {
                *cap = default_capacity();
            }
        }
        if self.endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
            self.endpoint = None;
        }
    }

    /// The periodic flush only runs with an endpoint and a positive interval.
    pub fn flush_enabled(&self) -> bool {
        self.endpoint.is_some() && self.flush_interval_ms > 0
    }
}

// ─── Caller-supplied overrides ───────────────────────────────────

/// Partial configuration passed to `initialize`; unset keys keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryOptions {
    pub enable_vitals: Option<bool>,
    pub enable_resource_timing: Option<bool>,
    pub enable_error_tracking: Option<bool>,
    pub enable_custom_metrics: Option<bool>,
    pub sampling_rate: Option<f64>,
    pub endpoint: Option<String>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_errors: Option<usize>,
    pub max_resources: Option<usize>,
    pub max_custom_samples: Option<usize>,
}

impl TelemetryOptions {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = Some(rate);
        self
    }

    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = Some(ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = TelemetryConfig::from_json("{}").unwrap();
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.flush_interval_ms, 30_000);
        assert!(!config.flush_enabled());
    }

    #[test]
    fn camel_case_keys() {
        let config = TelemetryConfig::from_json(
            r#"{"samplingRate":0.25,"endpoint":"http://c.test/t","enableVitals":false}"#,
        )
        .unwrap();
        assert_eq!(config.sampling_rate, 0.25);
        assert!(!config.enable_vitals);
        assert!(config.flush_enabled());
    }

    #[test]
    fn rejects_bad_sampling_rate() {
        let err = TelemetryConfig::from_json(r#"{"samplingRate":1.5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SamplingRate(r) if r == 1.5));
    }

    #[test]
    fn merge_only_touches_set_keys() {
        let mut config = TelemetryConfig::default();
        config.merge(
            TelemetryOptions::default()
                .endpoint("http://collector.test")
                .flush_interval_ms(0),
        );
        assert_eq!(config.endpoint.as_deref(), Some("http://collector.test"));
        assert_eq!(config.flush_interval_ms, 0);
        assert_eq!(config.sampling_rate, 1.0);
        assert!(!config.flush_enabled());
    }

    #[test]
    fn normalize_clamps_and_repairs() {
        let mut config = TelemetryConfig {
            sampling_rate: -3.0,
            max_errors: 0,
            endpoint: Some("  ".into()),
            ..TelemetryConfig::default()
        };
        config.normalize();
        assert_eq!(config.sampling_rate, 0.0);
        assert_eq!(config.max_errors, 1_000);
        assert_eq!(config.endpoint, None);
        assert!(config.validate().is_ok());
    }
}
