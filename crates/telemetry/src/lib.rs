//! Structured logging setup and enforcement-outcome observability.
//!
//! Generalizes the policy engine's observer/metrics/audit trio to
//! enforcement outcomes: bans and unbans issued, claims rejected, and
//! re-evaluations triggered.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use warden_core::identity::{RoomId, UserId};

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// OpenTelemetry pipeline setup failed.
    #[error("otel setup failed: {0}")]
    Otel(String),
}

/// Initialize structured JSON logging with an env filter.
/// Set `RUST_LOG`, e.g. `"info,evaluator=debug"`.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Initialize the optional OpenTelemetry tracer pipeline.
#[cfg(feature = "otel")]
pub fn init_otel(service_name: &str) -> Result<(), TelemetryError> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace as sdktrace;
    use opentelemetry_sdk::{runtime, Resource};

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.to_owned())]);
    let _tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().http())
        .with_trace_config(sdktrace::config().with_resource(resource))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Otel(e.to_string()))?;
    Ok(())
}

/// An enforcement outcome an evaluator produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A ban was issued in a protected room.
    BanIssued,
    /// An unban was issued in a protected room.
    UnbanIssued,
    /// A protection-claim attempt was rejected; another evaluator holds it.
    ClaimRejected,
    /// A retraction or config change triggered a re-evaluation pass.
    Reevaluated,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::BanIssued => "ban_issued",
            Outcome::UnbanIssued => "unban_issued",
            Outcome::ClaimRejected => "claim_rejected",
            Outcome::Reevaluated => "reevaluated",
        }
    }
}

/// One observed enforcement event, reported to [`EnforcementObserver`]s.
#[derive(Debug, Clone)]
pub struct EnforcementEvent {
    /// What happened.
    pub outcome: Outcome,
    /// The management room of the evaluator that produced it.
    pub management_room: RoomId,
    /// The user the outcome concerns, if applicable.
    pub target_user: Option<UserId>,
    /// The protected room the outcome concerns, if applicable.
    pub protected_room: Option<RoomId>,
}

/// Observer invoked for each enforcement event. Implementations must be
/// cheap and non-blocking; avoid I/O on the hot path.
pub trait EnforcementObserver: Send + Sync {
    /// Called on every enforcement outcome.
    fn on_enforcement(&self, event: &EnforcementEvent);
}

static OBSERVER: OnceLock<RwLock<Option<Arc<dyn EnforcementObserver>>>> = OnceLock::new();

/// Install (or clear) the process-global enforcement observer.
pub fn set_observer(observer: Option<Arc<dyn EnforcementObserver>>) {
    let cell = OBSERVER.get_or_init(|| RwLock::new(None));
    let mut w = cell.write().expect("observer write lock poisoned");
    *w = observer;
}

/// In-process counters for enforcement outcomes, keyed by `{management_room, outcome}`.
/// Low-cardinality by construction; not persisted across process restarts.
#[derive(Default)]
pub struct EnforcementMetrics {
    inner: Arc<Mutex<HashMap<String, u64>>>,
}

impl EnforcementMetrics {
    /// Read the current count for a `(management_room, outcome)` pair.
    pub fn count(&self, management_room: &str, outcome: Outcome) -> u64 {
        let key = format!("{management_room}:{}", outcome.as_str());
        self.inner.lock().expect("metrics lock poisoned").get(&key).copied().unwrap_or(0)
    }

    fn inc(&self, management_room: &str, outcome: Outcome) {
        let mut g = self.inner.lock().expect("metrics lock poisoned");
        *g.entry(format!("{management_room}:{}", outcome.as_str())).or_insert(0) += 1;
    }
}

static METRICS: OnceLock<EnforcementMetrics> = OnceLock::new();

/// Access the global enforcement metrics registry.
pub fn enforcement_metrics() -> &'static EnforcementMetrics {
    METRICS.get_or_init(EnforcementMetrics::default)
}

/// Record an enforcement event: bumps the metrics counter and notifies the
/// installed observer, if any. Evaluators call this instead of talking to
/// the observer/metrics singletons directly.
pub fn record_enforcement(event: EnforcementEvent) {
    enforcement_metrics().inc(event.management_room.as_str(), event.outcome);
    if let Some(lock) = OBSERVER.get() {
        if let Ok(guard) = lock.read() {
            if let Some(observer) = guard.as_ref() {
                observer.on_enforcement(&event);
            }
        }
    }
    tracing::info!(
        outcome = event.outcome.as_str(),
        management_room = event.management_room.as_str(),
        target_user = event.target_user.as_ref().map(UserId::as_str),
        protected_room = event.protected_room.as_ref().map(RoomId::as_str),
        "enforcement outcome"
    );
}
