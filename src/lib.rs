//! Client-side performance telemetry for the storefront.
//!
//! Collectors (Web Vitals, resource timing, errors, manual timings) write
//! into a process-local [`SnapshotStore`](store::SnapshotStore); the
//! emitter ships vitals and errors immediately under sampling and the
//! whole snapshot periodically, always best effort. The [`sink`] module is
//! the matching collection endpoint.

pub mod budget;
mod collectors;
pub mod config;
pub mod emitter;
pub mod error;
pub mod model;
mod pipeline;
pub mod platform;
pub mod rating;
pub mod simulator;
pub mod sink;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use budget::{BudgetOverrides, BudgetReport, PerformanceBudget, Violation};
pub use collectors::resources::SLOW_RESOURCE_MS;
pub use config::{TelemetryConfig, TelemetryOptions};
pub use model::{
    Context, EnrichedSnapshot, ErrorKind, ErrorRecord, ErrorReport, MetricSample,
    NavigationRecord, PerformanceSnapshot, ResourceRecord,
};
pub use platform::{LocalPlatform, PerformanceEntry, Platform};
pub use rating::{classify, Rating, VitalMetric};
pub use telemetry::Telemetry;
