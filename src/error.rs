use thiserror::Error;

use crate::platform::EntryKind;

// ─── Platform ────────────────────────────────────────────────────

/// The host environment lacks an observation API the pipeline asked for.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("performance entry type `{0}` is not supported by this platform")]
    Unsupported(EntryKind),

    #[error("global error hooks are not available on this platform")]
    HooksUnavailable,
}

// ─── Transport ───────────────────────────────────────────────────

/// Why a single POST to the collection endpoint failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collection endpoint answered with status {0}")]
    Status(u16),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("transport rejected payload: {0}")]
    Rejected(String),
}

// ─── Configuration ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("samplingRate must be within 0.0..=1.0, got {0}")]
    SamplingRate(f64),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

// ─── Sink ────────────────────────────────────────────────────────

/// A POSTed body parsed as JSON but is not a usable envelope.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("vital event has no valid sample: {0}")]
    MalformedVital(String),
}
