//! The host-environment seam.
//!
//! Collectors never talk to the outside world directly: they subscribe to
//! entry streams and error hooks through [`Platform`]. [`LocalPlatform`]
//! is the in-process implementation used by native hosts and tests; host
//! code pushes entries into it with [`LocalPlatform::dispatch`].

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Once, OnceLock, Weak};
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::model::{DeviceInfo, ErrorKind, MemoryInfo, NavigationRecord};

// ─── Entries ─────────────────────────────────────────────────────

/// Observation categories a collector can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Paint,
    LargestContentfulPaint,
    FirstInput,
    LayoutShift,
    Resource,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Paint => "paint",
            Self::LargestContentfulPaint => "largest-contentful-paint",
            Self::FirstInput => "first-input",
            Self::LayoutShift => "layout-shift",
            Self::Resource => "resource",
        })
    }
}

/// Per-request network timing. Times are ms relative to the time origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTiming {
    pub name: String,
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub transfer_size: u64,
    pub decoded_body_size: u64,
}

/// A single observed performance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PerformanceEntry {
    Paint {
        name: String,
        start_time: f64,
    },
    LargestContentfulPaint {
        start_time: f64,
    },
    FirstInput {
        start_time: f64,
        processing_start: f64,
    },
    LayoutShift {
        value: f64,
        had_recent_input: bool,
    },
    Resource(ResourceTiming),
}

impl PerformanceEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Paint { .. } => EntryKind::Paint,
            Self::LargestContentfulPaint { .. } => EntryKind::LargestContentfulPaint,
            Self::FirstInput { .. } => EntryKind::FirstInput,
            Self::LayoutShift { .. } => EntryKind::LayoutShift,
            Self::Resource(_) => EntryKind::Resource,
        }
    }
}

/// Raw navigation timing marks, ms relative to the time origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationTiming {
    pub start_time: f64,
    pub navigation_type: String,
    pub redirect_count: u32,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded_event_end: f64,
    pub dom_complete: f64,
    pub load_event_end: f64,
}

impl NavigationTiming {
    /// Reduce the raw marks to phase durations. Missing marks (zero)
    /// never produce negative phases.
    pub fn record(&self) -> NavigationRecord {
        let span = |from: f64, to: f64| (to - from).max(0.0);
        NavigationRecord {
            dns_ms: span(self.domain_lookup_start, self.domain_lookup_end),
            connect_ms: span(self.connect_start, self.connect_end),
            request_ms: span(self.request_start, self.response_start),
            response_ms: span(self.response_start, self.response_end),
            dom_processing_ms: span(self.dom_interactive, self.dom_complete),
            load_complete_ms: span(self.start_time, self.load_event_end),
            dom_ready_ms: span(self.start_time, self.dom_content_loaded_event_end),
            ttfb_ms: span(self.start_time, self.response_start),
            navigation_type: self.navigation_type.clone(),
            redirect_count: self.redirect_count,
        }
    }
}

/// An error caught by a global hook rather than reported explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalError {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Option<String>,
}

pub type EntryCallback = Arc<dyn Fn(PerformanceEntry) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(GlobalError) + Send + Sync>;

// ─── Platform trait ──────────────────────────────────────────────

/// Everything the pipeline needs from its host.
pub trait Platform: Send + Sync + 'static {
    /// Monotonic milliseconds since the time origin, if a clock exists.
    fn now_ms(&self) -> Option<f64>;

    /// Subscribe to entries of one kind. Subscriptions are never cancelled.
    fn observe(&self, kind: EntryKind, callback: EntryCallback) -> Result<(), PlatformError>;

    /// Hook uncaught errors and unhandled rejections.
    fn install_error_hooks(&self, callback: ErrorCallback) -> Result<(), PlatformError>;

    fn navigation_timing(&self) -> Option<NavigationTiming>;

    fn device_info(&self) -> DeviceInfo;

    fn memory_info(&self) -> Option<MemoryInfo>;

    fn page_url(&self) -> String;
}

// ─── LocalPlatform ───────────────────────────────────────────────

/// In-process performance timeline.
pub struct LocalPlatform {
    origin: Instant,
    has_clock: bool,
    has_error_hooks: bool,
    route_panics: bool,
    unsupported: HashSet<EntryKind>,
    page_url: String,
    device: DeviceInfo,
    memory: Option<MemoryInfo>,
    navigation: Option<NavigationTiming>,
    observers: RwLock<Vec<(EntryKind, EntryCallback)>>,
    error_hooks: RwLock<Vec<ErrorCallback>>,
}

impl LocalPlatform {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            origin: Instant::now(),
            has_clock: true,
            has_error_hooks: true,
            route_panics: false,
            unsupported: HashSet::new(),
            page_url: page_url.into(),
            device: native_device_info(),
            memory: None,
            navigation: None,
            observers: RwLock::new(Vec::new()),
            error_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Pretend `kind` cannot be observed.
    pub fn without(mut self, kind: EntryKind) -> Self {
        self.unsupported.insert(kind);
        self
    }

    pub fn without_clock(mut self) -> Self {
        self.has_clock = false;
        self
    }

    pub fn without_error_hooks(mut self) -> Self {
        self.has_error_hooks = false;
        self
    }

    /// Also report panics as uncaught errors (process-wide hook).
    pub fn route_panics(mut self) -> Self {
        self.route_panics = true;
        self
    }

    pub fn with_navigation(mut self, timing: NavigationTiming) -> Self {
        self.navigation = Some(timing);
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    pub fn with_memory(mut self, memory: MemoryInfo) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Deliver `entry` to every subscriber of its kind.
    pub fn dispatch(&self, entry: PerformanceEntry) {
        let kind = entry.kind();
        // Snapshot first: a callback may subscribe or dispatch again.
        let callbacks: Vec<EntryCallback> = self
            .observers
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(entry.clone());
        }
    }

    /// Fire the global error hooks, as an uncaught error would.
    pub fn raise(&self, error: GlobalError) {
        let hooks: Vec<ErrorCallback> = self.error_hooks.read().clone();
        for hook in hooks {
            hook(error.clone());
        }
    }

    /// Number of live subscriptions for `kind`.
    pub fn observer_count(&self, kind: EntryKind) -> usize {
        self.observers.read().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn error_hook_count(&self) -> usize {
        self.error_hooks.read().len()
    }
}

impl Platform for LocalPlatform {
    fn now_ms(&self) -> Option<f64> {
        self.has_clock
            .then(|| self.origin.elapsed().as_secs_f64() * 1000.0)
    }

    fn observe(&self, kind: EntryKind, callback: EntryCallback) -> Result<(), PlatformError> {
        if self.unsupported.contains(&kind) {
            return Err(PlatformError::Unsupported(kind));
        }
        self.observers.write().push((kind, callback));
        Ok(())
    }

    fn install_error_hooks(&self, callback: ErrorCallback) -> Result<(), PlatformError> {
        if !self.has_error_hooks {
            return Err(PlatformError::HooksUnavailable);
        }
        if self.route_panics {
            route_panics_to(&callback);
        }
        self.error_hooks.write().push(callback);
        Ok(())
    }

    fn navigation_timing(&self) -> Option<NavigationTiming> {
        self.navigation.clone()
    }

    fn device_info(&self) -> DeviceInfo {
        self.device.clone()
    }

    fn memory_info(&self) -> Option<MemoryInfo> {
        self.memory.clone()
    }

    fn page_url(&self) -> String {
        self.page_url.clone()
    }
}

fn native_device_info() -> DeviceInfo {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let language = std::env::var("LANG")
        .ok()
        .and_then(|l| l.split('.').next().map(|s| s.replace('_', "-")))
        .filter(|l| !l.is_empty() && l != "C" && l != "POSIX")
        .unwrap_or_else(|| "en-US".into());

    DeviceInfo {
        user_agent: format!(
            "{}/{} ({os}; {arch})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
        platform: format!("{os}-{arch}"),
        language,
        hardware_concurrency: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        device_memory_gb: None,
        connection: None,
    }
}

// ─── Panic routing ───────────────────────────────────────────────

type PanicSink = Weak<dyn Fn(GlobalError) + Send + Sync>;

static PANIC_HOOK: Once = Once::new();
/// Weak: the owning platform's hook list keeps each sink alive.
static PANIC_SINKS: OnceLock<RwLock<Vec<PanicSink>>> = OnceLock::new();

/// Installs the process-wide panic hook on first use (chained onto the
/// previous hook) and registers `sink` with it. Sinks of dropped
/// platforms are pruned here.
fn route_panics_to(sink: &ErrorCallback) {
    let sinks = PANIC_SINKS.get_or_init(|| RwLock::new(Vec::new()));
    {
        let mut sinks = sinks.write();
        sinks.retain(|s| s.strong_count() > 0);
        sinks.push(Arc::downgrade(sink));
    }

    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let payload = info.payload();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic with non-string payload".into());
            let message = match info.location() {
                Some(loc) => format!("{message} ({}:{})", loc.file(), loc.line()),
                None => message,
            };
            let backtrace = Backtrace::capture();
            let stack = (backtrace.status() == BacktraceStatus::Captured)
                .then(|| backtrace.to_string());

            let sinks: Vec<ErrorCallback> = PANIC_SINKS
                .get()
                .map(|s| s.read().iter().filter_map(Weak::upgrade).collect())
                .unwrap_or_default();
            for sink in sinks {
                sink(GlobalError {
                    kind: ErrorKind::Uncaught,
                    message: message.clone(),
                    stack: stack.clone(),
                });
            }
            previous(info);
        }));
    });
}
