//! Process counters, exported in Prometheus text format when the `metrics`
//! feature is enabled. Without it every recorder is a no-op.

use crate::strategies::types::Strategy;

#[cfg(feature = "metrics")]
mod registry {
    use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
    use std::sync::OnceLock;

    pub struct Metrics {
        pub registry: Registry,
        pub polls: IntCounter,
        pub source_failures: IntCounterVec,
        pub decisions: IntCounterVec,
    }

    fn build() -> prometheus::Result<Metrics> {
        let registry = Registry::new();

        let polls = IntCounter::new("hightemp_monitor_polls_total", "Monitor poll ticks")?;
        let source_failures = IntCounterVec::new(
            Opts::new("hightemp_source_failures_total", "Failed source fetches"),
            &["source"],
        )?;
        let decisions = IntCounterVec::new(
            Opts::new("hightemp_decisions_total", "Trading decisions by strategy"),
            &["strategy"],
        )?;

        registry.register(Box::new(polls.clone()))?;
        registry.register(Box::new(source_failures.clone()))?;
        registry.register(Box::new(decisions.clone()))?;

        Ok(Metrics {
            registry,
            polls,
            source_failures,
            decisions,
        })
    }

    pub fn get() -> Option<&'static Metrics> {
        static METRICS: OnceLock<Option<Metrics>> = OnceLock::new();
        METRICS.get_or_init(|| build().ok()).as_ref()
    }

    pub fn render() -> String {
        let Some(m) = get() else {
            return String::new();
        };
        let mut buf = Vec::new();
        if TextEncoder::new().encode(&m.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(feature = "metrics")]
pub fn record_poll() {
    if let Some(m) = registry::get() {
        m.polls.inc();
    }
}

#[cfg(feature = "metrics")]
pub fn record_source_failure(source: &str) {
    if let Some(m) = registry::get() {
        m.source_failures.with_label_values(&[source]).inc();
    }
}

#[cfg(feature = "metrics")]
pub fn record_decision(strategy: Strategy) {
    if let Some(m) = registry::get() {
        let label = strategy.to_string();
        m.decisions.with_label_values(&[label.as_str()]).inc();
    }
}

/// Current counters in Prometheus text format.
#[cfg(feature = "metrics")]
pub fn render() -> String {
    registry::render()
}

#[cfg(not(feature = "metrics"))]
pub fn record_poll() {}

#[cfg(not(feature = "metrics"))]
pub fn record_source_failure(_source: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_decision(_strategy: Strategy) {}

#[cfg(not(feature = "metrics"))]
pub fn render() -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_never_panic() {
        record_poll();
        record_source_failure("NWS");
        record_decision(Strategy::ObservedPeak);
        let _ = render();
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_decision_counter_exported() {
        record_decision(Strategy::CoolingTrendObserved);
        let text = render();
        assert!(text.contains("hightemp_decisions_total"));
        assert!(text.contains("cooling_trend_observed"));
    }
}
